//! Task event model: the append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::task::{Task, TaskStatus};

/// Tag describing what happened to a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Task moved between statuses. Details: `{from, to}`.
    StatusChange,
    /// Free-text operator note. Details: `{body}`.
    Comment,
    /// A message was associated with the task. Details: `{messageId, direction, ...}`.
    Message,
    /// Task came into existence. Details: `{source, ...}`.
    TaskCreated,
    /// Task gained a prerequisite. Details: `{requiredTaskId}`.
    DependencyAdded,
    /// Task lost a prerequisite. Details: `{requiredTaskId}`.
    DependencyRemoved,
}

impl EventType {
    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "STATUS_CHANGE",
            Self::Comment => "COMMENT",
            Self::Message => "MESSAGE",
            Self::TaskCreated => "TASK_CREATED",
            Self::DependencyAdded => "DEPENDENCY_ADDED",
            Self::DependencyRemoved => "DEPENDENCY_REMOVED",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STATUS_CHANGE" => Some(Self::StatusChange),
            "COMMENT" => Some(Self::Comment),
            "MESSAGE" => Some(Self::Message),
            "TASK_CREATED" => Some(Self::TaskCreated),
            "DEPENDENCY_ADDED" => Some(Self::DependencyAdded),
            "DEPENDENCY_REMOVED" => Some(Self::DependencyRemoved),
            _ => None,
        }
    }
}

/// Immutable audit entry describing something that happened to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Surrogate identifier; breaks ordering ties between equal timestamps.
    pub id: i64,
    /// Task the event is scoped to.
    pub task_id: i64,
    /// Owning client, when known.
    pub client_id: Option<i64>,
    /// What happened.
    pub event_type: EventType,
    /// Payload whose shape depends on `event_type`.
    pub details: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An event about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    /// Task the event is scoped to.
    pub task_id: i64,
    /// Owning client, when known.
    pub client_id: Option<i64>,
    /// What happened.
    pub event_type: EventType,
    /// Type-specific payload.
    pub details: Value,
}

impl NewEvent {
    /// Status transition on `task`.
    #[must_use]
    pub fn status_change(task: &Task, from: TaskStatus, to: TaskStatus) -> Self {
        Self {
            task_id: task.id,
            client_id: Some(task.client_id),
            event_type: EventType::StatusChange,
            details: json!({ "from": from, "to": to }),
        }
    }

    /// Operator comment on `task`.
    #[must_use]
    pub fn comment(task: &Task, body: &str) -> Self {
        Self {
            task_id: task.id,
            client_id: Some(task.client_id),
            event_type: EventType::Comment,
            details: json!({ "body": body }),
        }
    }

    /// Message association with arbitrary extra details merged in.
    #[must_use]
    pub fn message(task_id: i64, client_id: i64, details: Value) -> Self {
        Self {
            task_id,
            client_id: Some(client_id),
            event_type: EventType::Message,
            details,
        }
    }

    /// Task creation.
    #[must_use]
    pub fn task_created(task: &Task, details: Value) -> Self {
        Self {
            task_id: task.id,
            client_id: Some(task.client_id),
            event_type: EventType::TaskCreated,
            details,
        }
    }

    /// Dependency edge added to or removed from `dependent`.
    #[must_use]
    pub fn dependency(dependent: &Task, required_task_id: i64, added: bool) -> Self {
        Self {
            task_id: dependent.id,
            client_id: Some(dependent.client_id),
            event_type: if added {
                EventType::DependencyAdded
            } else {
                EventType::DependencyRemoved
            },
            details: json!({ "requiredTaskId": required_task_id }),
        }
    }
}

/// A task together with its event history, newest first.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskWithEvents {
    /// The task itself, flattened into the JSON object.
    #[serde(flatten)]
    pub task: Task,
    /// Events, newest first.
    pub events: Vec<Event>,
}
