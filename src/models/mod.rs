//! Domain model module declarations and shared timestamp helpers.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::{AppError, Result};

pub mod client;
pub mod dependency;
pub mod event;
pub mod message;
pub mod task;

/// Current time truncated to the microsecond precision stored in `SQLite`.
///
/// Truncation keeps in-memory entities equal to what a later read returns.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp as fixed-width RFC 3339 so stored values sort lexically.
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 column value.
///
/// # Errors
///
/// Returns `AppError::Db` naming `column` if the value is not RFC 3339.
pub fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}
