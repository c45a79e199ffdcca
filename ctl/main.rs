#![forbid(unsafe_code)]

//! `intake-desk-ctl`: local maintenance CLI for `intake-desk`.
//!
//! Operates directly on the configured `SQLite` database: drop and rebuild
//! the schema, or load the demo dataset.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use intake_desk::persistence::{db, schema, seed};
use intake_desk::{AppError, GlobalConfig, Result};

#[derive(Debug, Parser)]
#[command(
    name = "intake-desk-ctl",
    about = "Local maintenance CLI for intake-desk",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file shared with the server.
    #[arg(long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drop every table and recreate the schema. Destroys all data.
    Reset {
        /// Confirm the destructive reset.
        #[arg(long)]
        yes: bool,
    },
    /// Insert the demo clients, tasks, and dependency.
    Seed,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let outcome = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))
        .and_then(|runtime| runtime.block_on(run(cli)));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = GlobalConfig::load_from_path(&cli.config)?;
    let db_path = config.db_path.to_string_lossy().to_string();
    let pool = Arc::new(db::connect(&db_path).await?);

    match cli.command {
        Command::Reset { yes } => {
            if !yes {
                return Err(AppError::Config(
                    "reset destroys all data; pass --yes to confirm".into(),
                ));
            }
            schema::reset_schema(&pool).await?;
            info!(db = %db_path, "schema reset");
        }
        Command::Seed => {
            let summary = seed::seed_demo_data(pool).await?;
            info!(
                clients = summary.clients.len(),
                tasks = summary.tasks.len(),
                "demo data seeded"
            );
        }
    }
    Ok(())
}
