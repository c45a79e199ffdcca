//! Mail relay webhook signature verification.
//!
//! The relay signs `timestamp ++ token` with HMAC-SHA256 under the shared
//! signing key and sends the hex digest. Every failure path rejects.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signature triple as received from the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedToken {
    /// Unix seconds, as a decimal string.
    pub timestamp: Option<String>,
    /// Random per-request token.
    pub token: Option<String>,
    /// Hex HMAC-SHA256 of `timestamp ++ token`.
    pub signature: Option<String>,
}

/// Hex signature for `timestamp ++ token` under `key`.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the key cannot initialise the MAC.
pub fn sign(key: &str, timestamp: &str, token: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|err| AppError::Unauthorized(format!("unusable signing key: {err}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature triple against `key`.
///
/// `max_age_seconds` bounds the distance between the signed timestamp and
/// `now` in either direction; 0 disables the window.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` when the key is absent, any part of the
/// triple is missing or malformed, the timestamp is outside the window, or
/// the digest does not match.
pub fn verify(
    key: Option<&str>,
    signed: &SignedToken,
    max_age_seconds: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    let key = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::Unauthorized("signing key is not configured".into()))?;

    let (Some(timestamp), Some(token), Some(signature)) = (
        signed.timestamp.as_deref(),
        signed.token.as_deref(),
        signed.signature.as_deref(),
    ) else {
        return Err(AppError::Unauthorized("missing signature fields".into()));
    };

    let issued: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| AppError::Unauthorized("timestamp is not numeric".into()))?;
    if max_age_seconds > 0 {
        let skew = now.timestamp().abs_diff(issued);
        if skew > max_age_seconds {
            return Err(AppError::Unauthorized(format!(
                "timestamp outside the {max_age_seconds}s window"
            )));
        }
    }

    let expected = hex::decode(signature.trim())
        .map_err(|_| AppError::Unauthorized("signature is not hex".into()))?;

    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|err| AppError::Unauthorized(format!("unusable signing key: {err}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(token.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| AppError::Unauthorized("signature mismatch".into()))
}
