//! Message model covering inbound email and operator drafts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side originated a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Sent by the client to the team.
    Inbound,
    /// Sent by an operator to the client.
    Outbound,
}

impl MessageDirection {
    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// Delivery lifecycle of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Not yet sent; `sent_at` is null.
    Draft,
    /// Delivered; `sent_at` is set.
    Sent,
}

impl MessageStatus {
    /// Stored and wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }

    /// Parse the stored representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "sent" => Some(Self::Sent),
            _ => None,
        }
    }
}

/// A communication record optionally tied to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Surrogate identifier.
    pub id: i64,
    /// Owning client.
    pub client_id: i64,
    /// Linked task, always owned by the same client.
    pub task_id: Option<i64>,
    /// Who originated the message.
    pub direction: MessageDirection,
    /// Body text.
    pub body: String,
    /// Delivery lifecycle.
    pub status: MessageStatus,
    /// Delivery time; null while draft.
    pub sent_at: Option<DateTime<Utc>>,
    /// Email subject for inbound mail.
    pub subject: Option<String>,
    /// Transport message identifier (`Message-Id`) used for redelivery dedup.
    pub external_id: Option<String>,
    /// Conversation identifier (`In-Reply-To` or `Message-Id`).
    pub thread_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Fields required to insert a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Owning client.
    pub client_id: i64,
    /// Optional task link.
    pub task_id: Option<i64>,
    /// Who originated the message.
    pub direction: MessageDirection,
    /// Body text.
    pub body: String,
    /// Requested lifecycle status; inferred from `sent_at` when absent.
    pub status: Option<MessageStatus>,
    /// Explicit delivery time.
    pub sent_at: Option<DateTime<Utc>>,
    /// Email subject.
    pub subject: Option<String>,
    /// Transport message identifier.
    pub external_id: Option<String>,
    /// Conversation identifier.
    pub thread_id: Option<String>,
}

impl NewMessage {
    /// Operator-originated message with no delivery information yet.
    #[must_use]
    pub fn outbound(client_id: i64, body: String) -> Self {
        Self {
            client_id,
            task_id: None,
            direction: MessageDirection::Outbound,
            body,
            status: None,
            sent_at: None,
            subject: None,
            external_id: None,
            thread_id: None,
        }
    }

    /// Resolve the stored `(status, sent_at)` pair.
    ///
    /// A message is `sent` exactly when it carries a delivery time; asking
    /// for `sent` without one stamps `now`.
    #[must_use]
    pub fn delivery(&self, now: DateTime<Utc>) -> (MessageStatus, Option<DateTime<Utc>>) {
        match (self.status, self.sent_at) {
            (Some(MessageStatus::Draft), _) => (MessageStatus::Draft, None),
            (_, Some(at)) => (MessageStatus::Sent, Some(at)),
            (Some(MessageStatus::Sent), None) => (MessageStatus::Sent, Some(now)),
            (None, None) => (MessageStatus::Draft, None),
        }
    }
}

/// Partial message update; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    /// Task link; `Some(None)` detaches the message.
    pub task_id: Option<Option<i64>>,
    /// New body text.
    pub body: Option<String>,
    /// New subject; `Some(None)` clears it.
    pub subject: Option<Option<String>>,
}
