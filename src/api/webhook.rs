//! `POST /webhooks/email`: the mail relay's inbound delivery hook.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Form, Json};
use serde_json::{json, Value};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::intake::InboundEmail;
use crate::Result;

use super::AppState;

const SIGNATURE_HEADER: &str = "x-mailgun-signature";
const TOKEN_HEADER: &str = "x-mailgun-token";
const TIMESTAMP_HEADER: &str = "x-mailgun-timestamp";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parse the relay's form post, preferring header-borne signature fields.
#[must_use]
pub fn inbound_email(headers: &HeaderMap, form: &HashMap<String, String>) -> InboundEmail {
    let mut email = InboundEmail::from_form(form);
    if let Some(signature) = header(headers, SIGNATURE_HEADER) {
        email.signed.signature = Some(signature);
    }
    if let Some(token) = header(headers, TOKEN_HEADER) {
        email.signed.token = Some(token);
    }
    if let Some(timestamp) = header(headers, TIMESTAMP_HEADER) {
        email.signed.timestamp = Some(timestamp);
    }
    email
}

/// Ingest one inbound email.
///
/// # Errors
///
/// Propagates pipeline failures; each renders as its HTTP status.
pub async fn email(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("email_webhook", %request_id);

    let email = inbound_email(&headers, &form);
    let outcome = state.pipeline.ingest(&email).instrument(span).await?;

    let mut body = json!({
        "status": "success",
        "message": {
            "id": outcome.message_id,
            "task_id": outcome.task_id,
        },
    });
    if outcome.duplicate {
        body["duplicate"] = Value::Bool(true);
    }
    Ok(Json(body))
}
