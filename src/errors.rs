//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Caller-fixable request problem tied to specific fields.
    Validation {
        /// Human-readable summary.
        message: String,
        /// Required fields absent from the request.
        missing_fields: Vec<String>,
        /// Fields present but carrying unusable values.
        invalid_fields: Vec<String>,
    },
    /// Malformed request envelope that is not attributable to a named field.
    BadRequest(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Webhook signature missing, stale, or wrong.
    Unauthorized(String),
    /// Authenticated webhook from an address no client owns.
    UnknownSender(String),
    /// Classification oracle unreachable or returned unusable output.
    Classification(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Validation failure naming the missing and invalid fields.
    #[must_use]
    pub fn validation(
        message: impl Into<String>,
        missing_fields: Vec<String>,
        invalid_fields: Vec<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            missing_fields,
            invalid_fields,
        }
    }

    /// Validation failure for a single invalid field.
    #[must_use]
    pub fn invalid_field(message: impl Into<String>, field: &str) -> Self {
        Self::validation(message, Vec::new(), vec![field.to_owned()])
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Validation { message, .. } => write!(f, "validation: {message}"),
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::UnknownSender(msg) => write!(f, "unknown sender: {msg}"),
            Self::Classification(msg) => write!(f, "classification: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                let fields = unique_violation_fields(db_err.message());
                if !fields.is_empty() {
                    return Self::validation(
                        format!("{} already in use", fields.join(", ")),
                        Vec::new(),
                        fields,
                    );
                }
            }
        }
        Self::Db(err.to_string())
    }
}

/// Request field names for the columns named in an `SQLite`
/// `UNIQUE constraint failed: table.col_a, table.col_b` message.
fn unique_violation_fields(message: &str) -> Vec<String> {
    let Some((_, columns)) = message.split_once("UNIQUE constraint failed:") else {
        return Vec::new();
    };
    columns
        .split(',')
        .filter_map(|column| column.trim().rsplit('.').next())
        .filter(|column| !column.is_empty())
        .map(camel_case)
        .collect()
}

fn camel_case(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut upper = false;
    for ch in column.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("json column: {err}"))
    }
}
