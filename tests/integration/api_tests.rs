//! HTTP-level tests driving the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use intake_desk::api::{router, AppState};

use super::test_helpers::{encode_form, signed_form, test_state, StaticClassifier};

async fn app() -> (Router, Arc<AppState>) {
    let state = test_state(Arc::new(StaticClassifier::bug())).await;
    let router = router(Arc::clone(&state)).expect("router");
    (router, state)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

async fn create_client(app: &Router, email: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/clients",
        Some(json!({
            "organizationName": "Acme Corp",
            "firstName": "John",
            "lastName": "Doe",
            "email": email,
            "services": ["DEV", "DESIGN"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().expect("client id")
}

async fn create_task(app: &Router, client_id: i64, title: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/tasks",
        Some(json!({
            "clientId": client_id,
            "type": "FEATURE_REQUEST",
            "serviceCategory": "DEV",
            "urgency": "medium",
            "title": title
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().expect("task id")
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = app().await;
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn client_crud_round() {
    let (app, _) = app().await;
    let id = create_client(&app, "john.doe@acme.com").await;

    let (status, body) = call(&app, Method::GET, &format!("/api/clients/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["organizationName"], "Acme Corp");
    assert_eq!(body["services"], json!(["DEV", "DESIGN"]));

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/clients/{id}"),
        Some(json!({ "phone": "+1 555 0100" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phone"], "+1 555 0100");

    let (status, body) = call(&app, Method::GET, "/api/clients", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = call(&app, Method::DELETE, &format!("/api/clients/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, _) = call(&app, Method::GET, &format!("/api/clients/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_validation_names_fields() {
    let (app, _) = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/clients",
        Some(json!({
            "organizationName": "Acme Corp",
            "email": "not-an-email",
            "services": ["DEV", "MARKETING"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let missing = body["missingFields"].as_array().expect("missing list");
    assert!(missing.contains(&json!("firstName")));
    assert!(missing.contains(&json!("lastName")));
    let invalid = body["invalidFields"].as_array().expect("invalid list");
    assert!(invalid.contains(&json!("email")));
    assert!(invalid.contains(&json!("services")));
}

#[tokio::test]
async fn malformed_ids_and_bodies_are_bad_requests() {
    let (app, _) = app().await;

    let (status, body) = call(&app, Method::GET, "/api/tasks/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, Method::POST, "/api/tasks", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/api/tasks?clientId=x", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/api/tasks/status/done", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_entities_are_not_found() {
    let (app, _) = app().await;
    for uri in [
        "/api/clients/42",
        "/api/clients/42/tasks",
        "/api/tasks/42",
        "/api/tasks/42/events",
        "/api/tasks/42/dependencies",
        "/api/messages/42",
    ] {
        let (status, body) = call(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body["error"].is_string(), "{uri}");
    }

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/tasks/42/comments",
        Some(json!({ "body": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::POST, "/api/messages/42/send", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_lifecycle_with_history() {
    let (app, _) = app().await;
    let client_id = create_client(&app, "john.doe@acme.com").await;
    let task_id = create_task(&app, client_id, "Export to CSV").await;

    let (status, _) = call(
        &app,
        Method::PUT,
        &format!("/api/tasks/{task_id}"),
        Some(json!({ "status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, event) = call(
        &app,
        Method::POST,
        &format!("/api/tasks/{task_id}/comments"),
        Some(json!({ "body": "Called client" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["eventType"], "COMMENT");

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/tasks/{task_id}?includeEvents=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Export to CSV");
    assert_eq!(body["status"], "in_progress");
    let events = body["events"].as_array().expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["eventType"], "COMMENT");
    assert_eq!(events[1]["eventType"], "STATUS_CHANGE");
    assert_eq!(events[1]["details"], json!({ "from": "open", "to": "in_progress" }));

    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/api/clients/{client_id}/tasks?includeEvents=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["events"].as_array().map(Vec::len), Some(2));

    let (status, body) = call(&app, Method::GET, "/api/tasks/status/in_progress", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], task_id);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, Method::GET, &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dependencies_guard_closing() {
    let (app, _) = app().await;
    let client_id = create_client(&app, "john.doe@acme.com").await;
    let design = create_task(&app, client_id, "Design").await;
    let build = create_task(&app, client_id, "Build").await;

    let (status, edge) = call(
        &app,
        Method::POST,
        &format!("/api/tasks/{build}/dependencies"),
        Some(json!({ "requiredTaskId": design })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(edge["requiredTaskId"], design);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/tasks/{design}/dependencies"),
        Some(json!({ "requiredTaskId": build })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/tasks/{build}"),
        Some(json!({ "status": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["invalidFields"], json!(["status"]));

    let (status, body) = call(&app, Method::GET, &format!("/api/tasks/{build}/dependencies"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["requiredBy"], json!([]));

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/api/tasks/{build}/dependencies/{design}"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/tasks/{build}"),
        Some(json!({ "status": "closed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "closed");
}

#[tokio::test]
async fn messages_drafts_and_send() {
    let (app, _) = app().await;
    let client_id = create_client(&app, "john.doe@acme.com").await;
    let task_id = create_task(&app, client_id, "Export").await;

    let (status, draft) = call(
        &app,
        Method::POST,
        "/api/messages",
        Some(json!({
            "clientId": client_id,
            "taskId": task_id,
            "direction": "outbound",
            "body": "We are on it."
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{draft}");
    assert_eq!(draft["status"], "draft");
    assert!(draft["sentAt"].is_null());
    let draft_id = draft["id"].as_i64().expect("id");

    let (status, body) = call(&app, Method::GET, "/api/messages/drafts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, sent) = call(&app, Method::POST, &format!("/api/messages/{draft_id}/send"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["status"], "sent");
    assert!(sent["sentAt"].is_string());

    let (status, again) = call(&app, Method::POST, &format!("/api/messages/{draft_id}/send"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["sentAt"], sent["sentAt"]);

    let (status, body) = call(&app, Method::GET, &format!("/api/messages?taskId={task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], draft_id);

    let (status, body) = call(&app, Method::GET, &format!("/api/tasks/{task_id}/events"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["eventType"], "MESSAGE");
}

#[tokio::test]
async fn webhook_ingests_signed_email() {
    let (app, state) = app().await;
    create_client(&app, "john.doe@acme.com").await;

    let form = signed_form(
        "John Doe <john.doe@acme.com>",
        "The login page is broken.",
        Some("<web-1@acme.com>"),
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/email")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(encode_form(&form)))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body: Value = serde_json::from_slice(&bytes).expect("json");

    assert_eq!(body["status"], "success");
    let task_id = body["message"]["task_id"].as_i64().expect("task id");
    assert!(body.get("duplicate").is_none());

    let (status, task) = call(&app, Method::GET, &format!("/api/tasks/{task_id}?includeEvents=true"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["type"], "BUG");
    assert_eq!(task["events"].as_array().map(Vec::len), Some(2));

    // Same relay Message-Id again.
    let again = signed_form(
        "John Doe <john.doe@acme.com>",
        "The login page is broken.",
        Some("<web-1@acme.com>"),
    );
    let request = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/email")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(encode_form(&again)))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body["duplicate"], true);
    assert_eq!(body["message"]["task_id"], task_id);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
        .fetch_one(&*state.db)
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn blank_organization_name_is_invalid_on_update() {
    let (app, _) = app().await;
    let id = create_client(&app, "john.doe@acme.com").await;

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/clients/{id}"),
        Some(json!({ "organizationName": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["invalidFields"], json!(["organizationName"]));

    let (_, client) = call(&app, Method::GET, &format!("/api/clients/{id}"), None).await;
    assert_eq!(client["organizationName"], "Acme Corp");
}
