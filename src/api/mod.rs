//! HTTP surface: the inbound email webhook and the JSON entity API.

pub mod clients;
pub mod error;
pub mod messages;
pub mod tasks;
pub mod validate;
pub mod webhook;

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::classify::Classifier;
use crate::config::GlobalConfig;
use crate::intake::{ContentRules, IngestPipeline};
use crate::persistence::db::Database;
use crate::{AppError, Result};

/// Shared application state passed to every handler.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// `SQLite` connection pool.
    pub db: Arc<Database>,
    /// Compiled content and address patterns.
    pub rules: Arc<ContentRules>,
    /// Email ingestion pipeline.
    pub pipeline: IngestPipeline,
}

impl AppState {
    /// Wire state from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the content patterns fail to compile.
    pub fn new(
        config: Arc<GlobalConfig>,
        db: Arc<Database>,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self> {
        let rules = Arc::new(ContentRules::new()?);
        let pipeline = IngestPipeline::new(
            Arc::clone(&db),
            classifier,
            Arc::clone(&rules),
            config.webhook.clone(),
            config.classifier.timeout(),
        );
        Ok(Self {
            config,
            db,
            rules,
            pipeline,
        })
    }
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the full application router.
///
/// # Errors
///
/// Returns `AppError::Config` if `cors_origin` is not a valid header value.
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.config.cors_origin)
        .map_err(|err| AppError::Config(format!("invalid cors_origin: {err}")))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api = Router::new()
        .route("/clients", get(clients::list).post(clients::create))
        .route(
            "/clients/{id}",
            get(clients::show).put(clients::update).delete(clients::remove),
        )
        .route("/clients/{id}/tasks", get(clients::tasks))
        .route("/tasks", get(tasks::list).post(tasks::create))
        .route("/tasks/status/{status}", get(tasks::by_status))
        .route(
            "/tasks/{id}",
            get(tasks::show).put(tasks::update).delete(tasks::remove),
        )
        .route("/tasks/{id}/events", get(tasks::events))
        .route("/tasks/{id}/comments", post(tasks::comment))
        .route(
            "/tasks/{id}/dependencies",
            get(tasks::dependencies).post(tasks::add_dependency),
        )
        .route(
            "/tasks/{id}/dependencies/{required_id}",
            delete(tasks::remove_dependency),
        )
        .route("/messages", get(messages::list).post(messages::create))
        .route("/messages/drafts", get(messages::drafts))
        .route(
            "/messages/{id}",
            get(messages::show)
                .put(messages::update)
                .delete(messages::remove),
        )
        .route("/messages/{id}/send", post(messages::send));

    Ok(Router::new()
        .route("/health", get(health))
        .route("/webhooks/email", post(webhook::email))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Serve the router on the configured address until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the listener cannot bind or the server fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_addr();
    let app = router(state)?;

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind {bind}: {err}")))?;
    info!(%bind, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(ct.cancelled_owned())
        .await
        .map_err(|err| AppError::Io(format!("http server error: {err}")))?;

    info!("http server shut down");
    Ok(())
}
