//! Directed "cannot close until" edge between two tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `dependent_task_id` cannot close until `required_task_id` closes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    /// Surrogate identifier.
    pub id: i64,
    /// Task that waits.
    pub dependent_task_id: i64,
    /// Task that must close first.
    pub required_task_id: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
