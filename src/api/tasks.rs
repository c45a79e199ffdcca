//! `/api/tasks` handlers, including events, comments, and dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::dependency::TaskDependency;
use crate::models::event::{Event, TaskWithEvents};
use crate::models::task::{
    NewTask, ServiceCategory, Task, TaskPatch, TaskStatus, TaskType, Urgency,
};
use crate::persistence::dependency_repo::DependencyRepo;
use crate::persistence::event_repo::EventRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::{AppError, Result};

use super::error::{ApiPath, JsonObject};
use super::validate::{Fields, Filters};
use super::AppState;

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Task {id} not found"))
}

/// Task listing or single task, with or without embedded events.
#[derive(Serialize)]
#[serde(untagged)]
pub enum TaskView<T, E> {
    /// `includeEvents` absent.
    Plain(T),
    /// `includeEvents=true`.
    WithEvents(E),
}

/// `GET /api/tasks?clientId=&status=&includeEvents=`
///
/// # Errors
///
/// Returns `AppError::Validation` for malformed filters.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<TaskView<Vec<Task>, Vec<TaskWithEvents>>>> {
    let mut filters = Filters::new(&params);
    let client_id = filters.id("clientId");
    let status = filters.code("status", TaskStatus::parse);
    let include_events = filters.flag("includeEvents");
    filters.finish()?;

    let repo = TaskRepo::new(Arc::clone(&state.db));
    if include_events {
        Ok(Json(TaskView::WithEvents(
            repo.find_filtered_with_events(client_id, status).await?,
        )))
    } else {
        Ok(Json(TaskView::Plain(
            repo.find_filtered(client_id, status).await?,
        )))
    }
}

/// `GET /api/tasks/status/{status}`
///
/// # Errors
///
/// Returns `AppError::Validation` for an unknown status.
pub async fn by_status(
    State(state): State<Arc<AppState>>,
    ApiPath(status): ApiPath<String>,
) -> Result<Json<Vec<Task>>> {
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| AppError::invalid_field(format!("unknown status {status}"), "status"))?;
    let repo = TaskRepo::new(Arc::clone(&state.db));
    Ok(Json(repo.find_by_status(status).await?))
}

/// `POST /api/tasks`
///
/// # Errors
///
/// Returns `AppError::Validation` for missing or invalid fields, or
/// `AppError::NotFound` if the client does not exist.
pub async fn create(
    State(state): State<Arc<AppState>>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<Task>)> {
    let mut fields = Fields::new(&body);
    let client_id = fields.required_id("clientId");
    let task_type = fields.required_code("type", TaskType::parse);
    let service_category = fields.required_code("serviceCategory", ServiceCategory::parse);
    let urgency = fields.required_code("urgency", Urgency::parse);
    let status = fields.patch_code("status", TaskStatus::parse);
    let title = fields.required_str("title");
    let description = fields.nullable_str("description");
    fields.finish()?;

    let (Some(client_id), Some(task_type), Some(service_category), Some(urgency), Some(title)) =
        (client_id, task_type, service_category, urgency, title)
    else {
        return Err(AppError::BadRequest("incomplete task".into()));
    };

    let repo = TaskRepo::new(Arc::clone(&state.db));
    let task = repo
        .create(&NewTask {
            client_id,
            task_type,
            service_category,
            urgency,
            status: status.unwrap_or(TaskStatus::Open),
            title,
            description: description.flatten(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /api/tasks/{id}?includeEvents=true`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn show(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<TaskView<Task, TaskWithEvents>>> {
    let filters = Filters::new(&params);
    let include_events = filters.flag("includeEvents");
    filters.finish()?;

    let repo = TaskRepo::new(Arc::clone(&state.db));
    if include_events {
        repo.with_events(id)
            .await?
            .map(|task| Json(TaskView::WithEvents(task)))
            .ok_or_else(|| not_found(id))
    } else {
        repo.find_by_id(id)
            .await?
            .map(|task| Json(TaskView::Plain(task)))
            .ok_or_else(|| not_found(id))
    }
}

/// `PUT /api/tasks/{id}`
///
/// # Errors
///
/// Returns `AppError::Validation` for invalid fields or a blocked close, or
/// `AppError::NotFound` for an unknown id.
pub async fn update(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    JsonObject(body): JsonObject,
) -> Result<Json<Task>> {
    let mut fields = Fields::new(&body);
    let patch = TaskPatch {
        task_type: fields.patch_code("type", TaskType::parse),
        service_category: fields.patch_code("serviceCategory", ServiceCategory::parse),
        urgency: fields.patch_code("urgency", Urgency::parse),
        status: fields.patch_code("status", TaskStatus::parse),
        title: fields.patch_str("title"),
        description: fields.nullable_str("description"),
    };
    fields.finish()?;

    let repo = TaskRepo::new(Arc::clone(&state.db));
    repo.update(id, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// `DELETE /api/tasks/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn remove(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Value>> {
    let repo = TaskRepo::new(Arc::clone(&state.db));
    if repo.delete(id).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(not_found(id))
    }
}

/// `GET /api/tasks/{id}/events`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn events(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<Event>>> {
    let tasks = TaskRepo::new(Arc::clone(&state.db));
    if tasks.find_by_id(id).await?.is_none() {
        return Err(not_found(id));
    }
    let events = EventRepo::new(Arc::clone(&state.db));
    Ok(Json(events.events_for_task(id).await?))
}

/// `POST /api/tasks/{id}/comments` with `{body}`.
///
/// # Errors
///
/// Returns `AppError::Validation` without a body, or `AppError::NotFound`
/// for an unknown id.
pub async fn comment(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<Event>)> {
    let mut fields = Fields::new(&body);
    let text = fields.required_str("body");
    fields.finish()?;
    let Some(text) = text else {
        return Err(AppError::BadRequest("incomplete comment".into()));
    };

    let repo = TaskRepo::new(Arc::clone(&state.db));
    let event = repo.add_comment(id, &text).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Both directions of a task's dependency edges.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyView {
    /// Tasks this task waits on.
    pub requires: Vec<TaskDependency>,
    /// Tasks waiting on this task.
    pub required_by: Vec<TaskDependency>,
}

/// `GET /api/tasks/{id}/dependencies`
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown id.
pub async fn dependencies(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<DependencyView>> {
    let tasks = TaskRepo::new(Arc::clone(&state.db));
    if tasks.find_by_id(id).await?.is_none() {
        return Err(not_found(id));
    }
    let repo = DependencyRepo::new(Arc::clone(&state.db));
    Ok(Json(DependencyView {
        requires: repo.requirements_of(id).await?,
        required_by: repo.dependents_of(id).await?,
    }))
}

/// `POST /api/tasks/{id}/dependencies` with `{requiredTaskId}`.
///
/// # Errors
///
/// Returns `AppError::Validation` for a self-loop, duplicate, or cycle, or
/// `AppError::NotFound` if either task is unknown.
pub async fn add_dependency(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    JsonObject(body): JsonObject,
) -> Result<(StatusCode, Json<TaskDependency>)> {
    let mut fields = Fields::new(&body);
    let required = fields.required_id("requiredTaskId");
    fields.finish()?;
    let Some(required) = required else {
        return Err(AppError::BadRequest("incomplete dependency".into()));
    };

    let repo = DependencyRepo::new(Arc::clone(&state.db));
    let edge = repo.add(id, required).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

/// `DELETE /api/tasks/{id}/dependencies/{required_id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the edge does not exist.
pub async fn remove_dependency(
    State(state): State<Arc<AppState>>,
    ApiPath((id, required)): ApiPath<(i64, i64)>,
) -> Result<Json<Value>> {
    let repo = DependencyRepo::new(Arc::clone(&state.db));
    if repo.remove(id, required).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(AppError::NotFound(format!(
            "Task {id} does not depend on task {required}"
        )))
    }
}
