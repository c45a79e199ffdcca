//! `/api/messages` handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::models::message::{Message, MessageDirection, MessagePatch, MessageStatus, NewMessage};
use crate::persistence::message_repo::MessageRepo;
use crate::{AppError, Result};

use super::error::{ApiPath, JsonObject};
use super::validate::{Fields, Filters};
use super::AppState;

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Message {id} not found"))
}

/// `GET /api/messages?clientId=&taskId=`
///
/// A `clientId` filter wins over `taskId`.
///
/// # Errors
///
/// Returns `AppError::Validation` for malformed filters.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Message>>> {
    let mut filters = Filters::new(&params);
    let client_id = filters.id("clientId");
    let task_id = filters.id("taskId");
    filters.finish()?;

    let repo = MessageRepo::new(Arc::clone(&state.db));
    let messages = match (client_id, task_id) {
        (Some(client_id), _) => repo.find_by_client_id(client_id).await?,
        (None, Some(task_id)) => repo.find_by_task_id(task_id).await?,
        (None, None) => repo.find_all().await?,
    };
    Ok(Json(messages))
}

/// `GET /api/messages/drafts?clientId=`
///
/// # Errors
///
/// Returns `AppError::Validation` for a malformed filter.
pub async fn drafts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Message>>> {
    let mut filters = Filters::new(&params);
    let client_id = filters.id("clientId");
    filters.finish()?;

    let repo = MessageRepo::new(Arc::clone(&state.db));
    let messages = match client_id {
        Some(client_id) => repo.find_drafts_by_client_id(client_id).await?,
        None => repo.find_drafts().await?,
    };
    Ok(Json(messages))
}

/// `GET /api/messages/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn show(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Message>> {
    let repo = MessageRepo::new(Arc::clone(&state.db));
    repo.find_by_id(id).await?.map(Json).ok_or_else(|| not_found(id))
}

/// `POST /api/messages`
///
/// # Errors
///
/// Returns `AppError::Validation` for missing or invalid fields, or
/// `AppError::NotFound` if the client or task does not exist.
pub async fn create(
    State(state): State<Arc<AppState>>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<Message>)> {
    let mut fields = Fields::new(&body);
    let client_id = fields.required_id("clientId");
    let direction = fields.required_code("direction", MessageDirection::parse);
    let text = fields.required_str("body");
    let task_id = fields.nullable_id("taskId");
    let status = fields.patch_code("status", MessageStatus::parse);
    let sent_at = fields.timestamp("sentAt");
    let subject = fields.nullable_str("subject");
    fields.finish()?;

    let (Some(client_id), Some(direction), Some(text)) = (client_id, direction, text) else {
        return Err(AppError::BadRequest("incomplete message".into()));
    };

    let repo = MessageRepo::new(Arc::clone(&state.db));
    let message = repo
        .create(&NewMessage {
            client_id,
            task_id: task_id.flatten(),
            direction,
            body: text,
            status,
            sent_at,
            subject: subject.flatten(),
            external_id: None,
            thread_id: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// `PUT /api/messages/{id}`
///
/// # Errors
///
/// Returns `AppError::Validation` for invalid fields or a cross-client task
/// link, or `AppError::NotFound` for an unknown id.
pub async fn update(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Message>> {
    let mut fields = Fields::new(&body);
    let patch = MessagePatch {
        task_id: fields.nullable_id("taskId"),
        body: fields.patch_str("body"),
        subject: fields.nullable_str("subject"),
    };
    fields.finish()?;

    let repo = MessageRepo::new(Arc::clone(&state.db));
    repo.update(id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// `DELETE /api/messages/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>> {
    let repo = MessageRepo::new(Arc::clone(&state.db));
    if repo.delete(id).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(not_found(id))
    }
}

/// `POST /api/messages/{id}/send`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn send(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Message>> {
    let repo = MessageRepo::new(Arc::clone(&state.db));
    repo.mark_as_sent(id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}
