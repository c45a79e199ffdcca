#![forbid(unsafe_code)]

//! `intake-desk`: CRM server binary.
//!
//! Loads configuration and credentials, opens the database, and serves the
//! webhook and JSON API until ctrl-c or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use intake_desk::api::{self, AppState};
use intake_desk::classify::openai::OpenAiClassifier;
use intake_desk::config::GlobalConfig;
use intake_desk::persistence::db;
use intake_desk::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "intake-desk", about = "Email-to-task CRM server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("intake-desk server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
        config.validate()?;
    }
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db_path = config.db_path.to_string_lossy().to_string();
    let db = Arc::new(db::connect(&db_path).await?);
    info!("database connected");

    // ── Build shared application state ──────────────────
    let classifier = Arc::new(OpenAiClassifier::new(&config.classifier)?);
    let state = Arc::new(AppState::new(Arc::clone(&config), db, classifier)?);

    // ── Serve until shutdown ────────────────────────────
    let ct = CancellationToken::new();
    let server_ct = ct.clone();
    let mut server = tokio::spawn(async move { api::serve(state, server_ct).await });

    let finished_early = tokio::select! {
        () = shutdown_signal() => None,
        finished = &mut server => Some(finished),
    };
    let outcome = match finished_early {
        Some(finished) => finished,
        None => {
            info!("shutdown signal received");
            ct.cancel();
            server.await
        }
    };

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(%err, "http server failed");
            return Err(err);
        }
        Err(err) => {
            return Err(AppError::Io(format!("server task panicked: {err}")));
        }
    }

    info!("intake-desk shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
