//! Persistence layer modules.

pub mod client_repo;
pub mod db;
pub mod dependency_repo;
pub mod event_repo;
pub mod message_repo;
pub mod schema;
pub mod seed;
pub mod table;
pub mod task_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
