#![forbid(unsafe_code)]

//! `intake-desk`: a small CRM whose inbound email webhook turns client
//! mail into classified, auditable tasks.

pub mod api;
pub mod classify;
pub mod config;
pub mod errors;
pub mod intake;
pub mod models;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
