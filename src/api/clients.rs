//! `/api/clients` handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::models::client::{Client, ClientPatch, NewClient};
use crate::models::event::TaskWithEvents;
use crate::models::task::Task;
use crate::persistence::client_repo::ClientRepo;
use crate::persistence::event_repo::EventRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::{AppError, Result};

use super::error::{ApiPath, JsonObject};
use super::validate::{Fields, Filters};
use super::AppState;

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Client {id} not found"))
}

/// `GET /api/clients`
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Client>>> {
    let repo = ClientRepo::new(Arc::clone(&state.db));
    Ok(Json(repo.find_all().await?))
}

/// `POST /api/clients`
///
/// # Errors
///
/// Returns `AppError::Validation` for missing or invalid fields (including a
/// duplicate email), or `AppError::Db` if the insert fails.
pub async fn create(
    State(state): State<Arc<AppState>>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<Client>)> {
    let mut fields = Fields::new(&body);
    let organization_name = fields.required_str("organizationName");
    let first_name = fields.required_str("firstName");
    let last_name = fields.required_str("lastName");
    let email = fields.required_email("email", &state.rules);
    let phone = fields.nullable_str("phone");
    let services = fields.required_services("services");
    fields.finish()?;

    let (Some(organization_name), Some(first_name), Some(last_name), Some(email), Some(services)) =
        (organization_name, first_name, last_name, email, services)
    else {
        return Err(AppError::BadRequest("incomplete client".into()));
    };

    let repo = ClientRepo::new(Arc::clone(&state.db));
    let client = repo
        .create(&NewClient {
            organization_name,
            first_name,
            last_name,
            email,
            phone: phone.flatten(),
            services,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// `GET /api/clients/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn show(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Client>> {
    let repo = ClientRepo::new(Arc::clone(&state.db));
    repo.find_by_id(id).await?.map(Json).ok_or_else(|| not_found(id))
}

/// `PUT /api/clients/{id}`
///
/// # Errors
///
/// Returns `AppError::Validation` for invalid fields, or
/// `AppError::NotFound` for an unknown id.
pub async fn update(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Client>> {
    let mut fields = Fields::new(&body);
    let patch = ClientPatch {
        organization_name: fields.patch_str("organizationName"),
        first_name: fields.patch_str("firstName"),
        last_name: fields.patch_str("lastName"),
        email: fields.patch_email("email", &state.rules),
        phone: fields.nullable_str("phone"),
        services: fields.services("services"),
    };
    fields.finish()?;

    let repo = ClientRepo::new(Arc::clone(&state.db));
    repo.update(id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// `DELETE /api/clients/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id, or `AppError::Db` if the
/// cascade fails.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>> {
    let repo = ClientRepo::new(Arc::clone(&state.db));
    if repo.delete(id).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(not_found(id))
    }
}

/// Client task listing; either plain tasks or tasks with their events.
#[derive(serde::Serialize)]
#[serde(untagged)]
pub enum ClientTasks {
    /// `includeEvents` absent.
    Plain(Vec<Task>),
    /// `includeEvents=true`.
    WithEvents(Vec<TaskWithEvents>),
}

/// `GET /api/clients/{id}/tasks?includeEvents=true`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown client.
pub async fn tasks(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ClientTasks>> {
    let filters = Filters::new(&params);
    let include_events = filters.flag("includeEvents");
    filters.finish()?;

    let clients = ClientRepo::new(Arc::clone(&state.db));
    if clients.find_by_id(id).await?.is_none() {
        return Err(not_found(id));
    }

    if include_events {
        let events = EventRepo::new(Arc::clone(&state.db));
        Ok(Json(ClientTasks::WithEvents(
            events.tasks_with_events(id).await?,
        )))
    } else {
        let tasks = TaskRepo::new(Arc::clone(&state.db));
        Ok(Json(ClientTasks::Plain(tasks.find_by_client_id(id).await?)))
    }
}
