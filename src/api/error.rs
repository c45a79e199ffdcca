//! JSON error responses and request-body extraction.

use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::AppError;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Validation {
                message,
                missing_fields,
                invalid_fields,
            } => {
                let mut body = Map::new();
                body.insert("error".into(), Value::String(message));
                if !missing_fields.is_empty() {
                    body.insert("missingFields".into(), json!(missing_fields));
                }
                if !invalid_fields.is_empty() {
                    body.insert("invalidFields".into(), json!(invalid_fields));
                }
                (StatusCode::BAD_REQUEST, Value::Object(body))
            }
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            Self::Unauthorized(msg) => {
                warn!(reason = %msg, "request rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "error": "Invalid webhook signature" }),
                )
            }
            Self::UnknownSender(_) => (StatusCode::NOT_FOUND, json!({ "error": "Unknown sender" })),
            other @ (Self::Config(_) | Self::Db(_) | Self::Classification(_) | Self::Io(_)) => {
                error!(err = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error", "details": other.to_string() }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// A JSON object request body; anything else is a 400.
#[derive(Debug, Clone)]
pub struct JsonObject(pub Map<String, Value>);

impl<S> FromRequest<S> for JsonObject
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(AppError::BadRequest(
                "request body must be a JSON object".into(),
            )),
        }
    }
}

/// Path parameters whose parse failures render as JSON 400s.
#[derive(Debug, Clone, Copy)]
pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}
