use intake_desk::AppError;

#[test]
fn display_prefixes_each_variant() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::BadRequest("nope".into()), "bad request: nope"),
        (AppError::NotFound("Task 9 not found".into()), "not found: Task 9 not found"),
        (AppError::Unauthorized("stale".into()), "unauthorized: stale"),
        (AppError::UnknownSender("a@b.co".into()), "unknown sender: a@b.co"),
        (AppError::Classification("timed out".into()), "classification: timed out"),
        (AppError::Io("bind".into()), "io: bind"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn invalid_field_names_one_field() {
    let err = AppError::invalid_field("status cannot close", "status");
    match err {
        AppError::Validation {
            message,
            missing_fields,
            invalid_fields,
        } => {
            assert_eq!(message, "status cannot close");
            assert!(missing_fields.is_empty());
            assert_eq!(invalid_fields, vec!["status".to_owned()]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn toml_errors_convert_to_config() {
    let toml_err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err: AppError = toml_err.into();
    assert!(matches!(err, AppError::Config(msg) if msg.starts_with("invalid config")));
}

#[test]
fn sqlx_errors_convert_to_db() {
    let err: AppError = sqlx::Error::RowNotFound.into();
    assert!(matches!(err, AppError::Db(_)));
}
