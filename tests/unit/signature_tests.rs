use chrono::{TimeZone, Utc};

use intake_desk::intake::signature::{sign, verify};
use intake_desk::intake::SignedToken;
use intake_desk::AppError;

const KEY: &str = "key-3ax6xnjp29jd6fds4gc373sgvjxteol0";

fn signed_at(timestamp: i64) -> SignedToken {
    let timestamp = timestamp.to_string();
    let signature = sign(KEY, &timestamp, "random-token").expect("sign");
    SignedToken {
        timestamp: Some(timestamp),
        token: Some("random-token".into()),
        signature: Some(signature),
    }
}

fn at(seconds: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
}

#[test]
fn sign_matches_known_vector() {
    // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
    let digest = sign("key", "The quick brown fox ", "jumps over the lazy dog").expect("sign");
    assert_eq!(
        digest,
        "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn fresh_valid_signature_is_accepted() {
    let now = 1_700_000_000;
    verify(Some(KEY), &signed_at(now - 30), 900, at(now)).expect("valid signature");
}

#[test]
fn tampered_token_is_rejected() {
    let now = 1_700_000_000;
    let mut signed = signed_at(now);
    signed.token = Some("other-token".into());
    assert!(matches!(
        verify(Some(KEY), &signed, 900, at(now)),
        Err(AppError::Unauthorized(_))
    ));
}

#[test]
fn wrong_key_is_rejected() {
    let now = 1_700_000_000;
    assert!(verify(Some("another-key"), &signed_at(now), 900, at(now)).is_err());
}

#[test]
fn missing_key_rejects_everything() {
    let now = 1_700_000_000;
    assert!(verify(None, &signed_at(now), 900, at(now)).is_err());
    assert!(verify(Some(""), &signed_at(now), 900, at(now)).is_err());
}

#[test]
fn stale_and_future_timestamps_are_rejected() {
    let now = 1_700_000_000;
    assert!(verify(Some(KEY), &signed_at(now - 901), 900, at(now)).is_err());
    assert!(verify(Some(KEY), &signed_at(now + 901), 900, at(now)).is_err());
    verify(Some(KEY), &signed_at(now - 900), 900, at(now)).expect("edge of window");
}

#[test]
fn zero_window_disables_age_check() {
    let now = 1_700_000_000;
    verify(Some(KEY), &signed_at(now - 86_400), 0, at(now)).expect("age ignored");
}

#[test]
fn malformed_fields_are_rejected() {
    let now = 1_700_000_000;

    let mut missing = signed_at(now);
    missing.signature = None;
    assert!(verify(Some(KEY), &missing, 900, at(now)).is_err());

    let mut not_numeric = signed_at(now);
    not_numeric.timestamp = Some("yesterday".into());
    assert!(verify(Some(KEY), &not_numeric, 900, at(now)).is_err());

    let mut not_hex = signed_at(now);
    not_hex.signature = Some("zz-not-hex".into());
    assert!(verify(Some(KEY), &not_hex, 900, at(now)).is_err());

    assert!(verify(Some(KEY), &SignedToken::default(), 900, at(now)).is_err());
}
