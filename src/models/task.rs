//! Task model and its classification enumerations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// New capability requested by the client.
    FeatureRequest,
    /// Defect report.
    Bug,
    /// Change to previously delivered work.
    Revision,
    /// Investigation or analysis.
    Research,
    /// Question needing an answer rather than work.
    Question,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::FeatureRequest,
        Self::Bug,
        Self::Revision,
        Self::Research,
        Self::Question,
    ];

    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FeatureRequest => "FEATURE_REQUEST",
            Self::Bug => "BUG",
            Self::Revision => "REVISION",
            Self::Research => "RESEARCH",
            Self::Question => "QUESTION",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Service line a task or client subscription belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCategory {
    /// Product strategy.
    Strategy,
    /// Design work.
    Design,
    /// Software development.
    Dev,
    /// Consulting.
    Consult,
}

impl ServiceCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 4] = [Self::Strategy, Self::Design, Self::Dev, Self::Consult];

    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strategy => "STRATEGY",
            Self::Design => "DESIGN",
            Self::Dev => "DEV",
            Self::Consult => "CONSULT",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

/// How soon the client needs the work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Needs immediate attention.
    Urgent,
    /// Normal priority.
    Medium,
    /// Can wait.
    Low,
}

impl Urgency {
    /// Every urgency, in declaration order.
    pub const ALL: [Self; 3] = [Self::Urgent, Self::Medium, Self::Low];

    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.as_str() == s)
    }
}

/// Lifecycle status for a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Newly created, not yet started.
    Open,
    /// Waiting on something outside the team.
    Blocked,
    /// Being worked on.
    InProgress,
    /// Awaiting internal review.
    NeedsReview,
    /// Awaiting client sign-off.
    NeedsClientReview,
    /// Done.
    Closed,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Open,
        Self::Blocked,
        Self::InProgress,
        Self::NeedsReview,
        Self::NeedsClientReview,
        Self::Closed,
    ];

    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Blocked => "blocked",
            Self::InProgress => "in_progress",
            Self::NeedsReview => "needs_review",
            Self::NeedsClientReview => "needs_client_review",
            Self::Closed => "closed",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

/// A unit of requested work tracked through a status lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Surrogate identifier.
    pub id: i64,
    /// Owning client.
    pub client_id: i64,
    /// Kind of work.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Service line.
    pub service_category: ServiceCategory,
    /// Priority.
    pub urgency: Urgency,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Short summary.
    pub title: String,
    /// Longer free-text description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Owning client.
    pub client_id: i64,
    /// Kind of work.
    pub task_type: TaskType,
    /// Service line.
    pub service_category: ServiceCategory,
    /// Priority.
    pub urgency: Urgency,
    /// Initial status.
    pub status: TaskStatus,
    /// Short summary.
    pub title: String,
    /// Longer free-text description.
    pub description: Option<String>,
}

/// Partial task update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New task type.
    pub task_type: Option<TaskType>,
    /// New service category.
    pub service_category: Option<ServiceCategory>,
    /// New urgency.
    pub urgency: Option<Urgency>,
    /// New status; a change records a `STATUS_CHANGE` event.
    pub status: Option<TaskStatus>,
    /// New title.
    pub title: Option<String>,
    /// New description; `Some(None)` clears it.
    pub description: Option<Option<String>>,
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
