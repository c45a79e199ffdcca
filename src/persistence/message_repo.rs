//! Message repository for `SQLite` persistence.

use std::sync::Arc;

use serde_json::json;
use sqlx::SqliteConnection;
use tracing::info;

use crate::models::event::NewEvent;
use crate::models::message::{
    Message, MessageDirection, MessagePatch, MessageStatus, NewMessage,
};
use crate::models::{format_timestamp, now, parse_timestamp};
use crate::{AppError, Result};

use super::client_repo;
use super::db::{self, Database};
use super::event_repo;
use super::table::{self, Columns, Mapping, SqlValue, Table};
use super::task_repo;

/// Repository wrapper around `SQLite` for message records.
#[derive(Clone)]
pub struct MessageRepo {
    table: Table<Message>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub struct MessageRow {
    id: i64,
    client_id: i64,
    task_id: Option<i64>,
    direction: String,
    body: String,
    status: String,
    sent_at: Option<String>,
    subject: Option<String>,
    external_id: Option<String>,
    thread_id: Option<String>,
    created_at: String,
}

impl Mapping for Message {
    const TABLE: &'static str = "messages";
    type Row = MessageRow;

    fn from_row(row: MessageRow) -> Result<Self> {
        let direction = MessageDirection::parse(&row.direction)
            .ok_or_else(|| AppError::Db(format!("invalid direction: {}", row.direction)))?;
        let status = MessageStatus::parse(&row.status)
            .ok_or_else(|| AppError::Db(format!("invalid message status: {}", row.status)))?;
        let sent_at = row
            .sent_at
            .as_deref()
            .map(|raw| parse_timestamp("sent_at", raw))
            .transpose()?;

        Ok(Self {
            id: row.id,
            client_id: row.client_id,
            task_id: row.task_id,
            direction,
            body: row.body,
            status,
            sent_at,
            subject: row.subject,
            external_id: row.external_id,
            thread_id: row.thread_id,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

fn insert_columns(message: &NewMessage) -> Columns {
    let created_at = now();
    let (status, sent_at) = message.delivery(created_at);
    vec![
        ("client_id", message.client_id.into()),
        ("task_id", message.task_id.into()),
        ("direction", message.direction.as_str().into()),
        ("body", message.body.clone().into()),
        ("status", status.as_str().into()),
        ("sent_at", sent_at.as_ref().map(format_timestamp).into()),
        ("subject", message.subject.clone().into()),
        ("external_id", message.external_id.clone().into()),
        ("thread_id", message.thread_id.clone().into()),
        ("created_at", format_timestamp(&created_at).into()),
    ]
}

fn patch_columns(patch: &MessagePatch) -> Columns {
    let mut columns: Columns = Vec::new();
    if let Some(v) = patch.task_id {
        columns.push(("task_id", v.into()));
    }
    if let Some(ref v) = patch.body {
        columns.push(("body", v.clone().into()));
    }
    if let Some(ref v) = patch.subject {
        columns.push(("subject", v.clone().into()));
    }
    columns
}

/// Details payload for a `MESSAGE` event.
fn message_event(message: &Message, task_id: i64) -> NewEvent {
    NewEvent::message(
        task_id,
        message.client_id,
        json!({
            "messageId": message.id,
            "direction": message.direction,
            "subject": message.subject,
        }),
    )
}

/// Fail unless `task_id` exists and belongs to `client_id`.
async fn ensure_task_owned_in(
    conn: &mut SqliteConnection,
    task_id: i64,
    client_id: i64,
) -> Result<()> {
    let task = task_repo::require_in(conn, task_id).await?;
    if task.client_id == client_id {
        Ok(())
    } else {
        Err(AppError::invalid_field(
            format!("task {task_id} does not belong to client {client_id}"),
            "taskId",
        ))
    }
}

/// Insert a message on an existing connection without recording any event.
///
/// # Errors
///
/// Returns `AppError::Validation` (fields `clientId`, `externalId`) if the
/// client already has a message with this `external_id`, or `AppError::Db`
/// if the insert fails.
pub async fn insert_in(conn: &mut SqliteConnection, message: &NewMessage) -> Result<Message> {
    table::insert_in(conn, insert_columns(message)).await
}

/// Point `message_id` at `task_id` and record the `MESSAGE` event.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the message vanished, or `AppError::Db`
/// if persistence fails.
pub async fn link_task_in(
    conn: &mut SqliteConnection,
    message_id: i64,
    task_id: i64,
) -> Result<Message> {
    let linked: Message = table::update_in(&mut *conn, message_id, vec![("task_id", task_id.into())])
        .await?
        .ok_or_else(|| AppError::NotFound(format!("message {message_id} not found")))?;
    event_repo::record_in(conn, &message_event(&linked, task_id)).await?;
    Ok(linked)
}

/// Look up one client's message by transport identifier on an existing
/// connection. Identifiers are only unique per client.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn find_by_external_id_in(
    conn: &mut SqliteConnection,
    client_id: i64,
    external_id: &str,
) -> Result<Option<Message>> {
    table::select_one_in(
        conn,
        "client_id = ?1 AND external_id = ?2",
        vec![SqlValue::from(client_id), SqlValue::from(external_id)],
    )
    .await
}

impl MessageRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            table: Table::new(db),
        }
    }

    /// Insert a message, resolving its delivery status.
    ///
    /// A message linked to a task also records a `MESSAGE` event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the client or task does not exist,
    /// `AppError::Validation` (field `taskId`) if the task belongs to another
    /// client, or `AppError::Db` if persistence fails.
    pub async fn create(&self, message: &NewMessage) -> Result<Message> {
        let mut tx = db::begin_write(self.table.db()).await?;
        client_repo::ensure_exists_in(&mut tx, message.client_id).await?;
        if let Some(task_id) = message.task_id {
            ensure_task_owned_in(&mut tx, task_id, message.client_id).await?;
        }

        let created = insert_in(&mut tx, message).await?;
        if let Some(task_id) = created.task_id {
            event_repo::record_in(&mut tx, &message_event(&created, task_id)).await?;
        }
        tx.commit().await?;

        info!(
            message_id = created.id,
            client_id = created.client_id,
            status = created.status.as_str(),
            "message created"
        );
        Ok(created)
    }

    /// Retrieve a message by identifier; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Message>> {
        self.table.find_by_id(id).await
    }

    /// List every message, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_all(&self) -> Result<Vec<Message>> {
        self.table
            .find_where("1 = 1", Vec::new(), "created_at DESC, id DESC")
            .await
    }

    /// A client's conversation in chronological order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_client_id(&self, client_id: i64) -> Result<Vec<Message>> {
        self.table
            .find_where(
                "client_id = ?1",
                vec![SqlValue::from(client_id)],
                "created_at ASC, id ASC",
            )
            .await
    }

    /// Messages linked to a task, most recently sent first.
    ///
    /// Drafts have no `sent_at` and sort after sent messages.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_task_id(&self, task_id: i64) -> Result<Vec<Message>> {
        self.table
            .find_where(
                "task_id = ?1",
                vec![SqlValue::from(task_id)],
                "sent_at IS NULL, sent_at DESC, id DESC",
            )
            .await
    }

    /// Every unsent message, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_drafts(&self) -> Result<Vec<Message>> {
        self.table
            .find_where("sent_at IS NULL", Vec::new(), "created_at DESC, id DESC")
            .await
    }

    /// One client's unsent messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_drafts_by_client_id(&self, client_id: i64) -> Result<Vec<Message>> {
        self.table
            .find_where(
                "sent_at IS NULL AND client_id = ?1",
                vec![SqlValue::from(client_id)],
                "created_at DESC, id DESC",
            )
            .await
    }

    /// Look up one client's message by transport identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_external_id(
        &self,
        client_id: i64,
        external_id: &str,
    ) -> Result<Option<Message>> {
        self.table
            .find_one_where(
                "client_id = ?1 AND external_id = ?2",
                vec![SqlValue::from(client_id), SqlValue::from(external_id)],
            )
            .await
    }

    /// Apply a partial update and return the re-read message.
    ///
    /// Linking to a different task records a `MESSAGE` event on that task.
    /// Returns `Ok(None)` if the message does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the new task does not exist,
    /// `AppError::Validation` (field `taskId`) if it belongs to another
    /// client, or `AppError::Db` if persistence fails.
    pub async fn update(&self, id: i64, patch: &MessagePatch) -> Result<Option<Message>> {
        let mut tx = db::begin_write(self.table.db()).await?;

        let Some(current) = table::find_by_id_in::<Message>(&mut tx, id).await? else {
            return Ok(None);
        };

        let new_link = match patch.task_id {
            Some(Some(task_id)) if current.task_id != Some(task_id) => {
                ensure_task_owned_in(&mut tx, task_id, current.client_id).await?;
                Some(task_id)
            }
            _ => None,
        };

        let updated: Option<Message> = table::update_in(&mut tx, id, patch_columns(patch)).await?;
        if let (Some(message), Some(task_id)) = (&updated, new_link) {
            event_repo::record_in(&mut tx, &message_event(message, task_id)).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Mark a message as sent now; already-sent messages are returned as-is.
    ///
    /// Returns `Ok(None)` if the message does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn mark_as_sent(&self, id: i64) -> Result<Option<Message>> {
        let mut tx = db::begin_write(self.table.db()).await?;

        let Some(current) = table::find_by_id_in::<Message>(&mut tx, id).await? else {
            return Ok(None);
        };
        if current.status == MessageStatus::Sent {
            return Ok(Some(current));
        }

        let sent: Option<Message> = table::update_in(
            &mut tx,
            id,
            vec![
                ("status", MessageStatus::Sent.as_str().into()),
                ("sent_at", format_timestamp(&now()).into()),
            ],
        )
        .await?;
        tx.commit().await?;

        info!(message_id = id, "message marked as sent");
        Ok(sent)
    }

    /// Delete a message; `Ok(false)` when absent.
    ///
    /// Events that mention the message stay in the task history.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = db::begin_write(self.table.db()).await?;
        let deleted = table::delete_in::<Message>(&mut tx, id).await?;
        tx.commit().await?;
        Ok(deleted)
    }
}
