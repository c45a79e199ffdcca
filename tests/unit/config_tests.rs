use std::io::Write;
use std::time::Duration;

use intake_desk::{config::GlobalConfig, AppError};

fn sample_toml() -> &'static str {
    r#"
db_path = "data/intake.db"
http_host = "0.0.0.0"
http_port = 8080
cors_origin = "http://localhost:5173"

[webhook]
max_timestamp_age_seconds = 300
require_signature = true

[classifier]
endpoint = "http://localhost:9999/v1/chat/completions"
model = "gpt-4o-mini"
timeout_seconds = 10
"#
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");

    assert_eq!(config.db_path.to_string_lossy(), "data/intake.db");
    assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    assert_eq!(config.cors_origin, "http://localhost:5173");
    assert_eq!(config.webhook.max_timestamp_age_seconds, 300);
    assert!(config.webhook.require_signature);
    assert_eq!(config.classifier.model, "gpt-4o-mini");
    assert_eq!(config.classifier.timeout(), Duration::from_secs(10));
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str(
        r#"
db_path = "intake.db"
cors_origin = "http://localhost:5173"
"#,
    )
    .expect("valid config");

    assert_eq!(config.bind_addr(), "127.0.0.1:3000");
    assert_eq!(config.webhook.max_timestamp_age_seconds, 900);
    assert!(config.webhook.require_signature);
    assert_eq!(
        config.classifier.endpoint,
        "https://api.openai.com/v1/chat/completions"
    );
    assert_eq!(config.classifier.timeout_seconds, 30);
}

#[test]
fn credentials_are_never_read_from_toml() {
    let config = GlobalConfig::from_toml_str(
        r#"
db_path = "intake.db"
cors_origin = "http://localhost:5173"

[webhook]
signing_key = "from-file"

[classifier]
api_key = "from-file"
"#,
    )
    .expect("unknown-but-skipped keys are ignored");

    assert!(config.webhook.signing_key.is_none());
    assert!(config.classifier.api_key.is_empty());
}

#[test]
fn empty_cors_origin_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r#"
db_path = "intake.db"
cors_origin = "  "
"#,
    );
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("cors_origin")));
}

#[test]
fn zero_http_port_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r#"
db_path = "intake.db"
http_port = 0
cors_origin = "http://localhost:5173"
"#,
    );
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("http_port")));
}

#[test]
fn port_override_is_revalidated() {
    let mut config = GlobalConfig::from_toml_str(sample_toml()).expect("valid config");
    config.http_port = 0;
    assert!(matches!(config.validate(), Err(AppError::Config(msg)) if msg.contains("http_port")));
}

#[test]
fn zero_classifier_timeout_is_rejected() {
    let result = GlobalConfig::from_toml_str(
        r#"
db_path = "intake.db"
cors_origin = "http://localhost:5173"

[classifier]
timeout_seconds = 0
"#,
    );
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("timeout_seconds")));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("db_path = ");
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(sample_toml().as_bytes()).expect("write config");

    let config = GlobalConfig::load_from_path(file.path()).expect("load config");
    assert_eq!(config.http_port, 8080);
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("failed to read config")));
}
