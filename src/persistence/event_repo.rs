//! Append-only task event log.
//!
//! Events are written alongside the change they describe (inside the same
//! transaction) and never updated. They disappear only when their task or
//! client is deleted.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::models::event::{Event, EventType, NewEvent, TaskWithEvents};
use crate::models::task::Task;
use crate::models::{format_timestamp, now, parse_timestamp};
use crate::{AppError, Result};

use super::db::{self, Database};
use super::table::{self, Mapping, SqlValue, Table};

/// Newest first; the id breaks ties between equal timestamps.
const NEWEST_FIRST: &str = "created_at DESC, id DESC";

/// Repository for task events.
#[derive(Clone)]
pub struct EventRepo {
    table: Table<Event>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub struct EventRow {
    id: i64,
    task_id: i64,
    client_id: Option<i64>,
    event_type: String,
    details: String,
    created_at: String,
}

impl Mapping for Event {
    const TABLE: &'static str = "events";
    type Row = EventRow;

    fn from_row(row: EventRow) -> Result<Self> {
        let event_type = EventType::parse(&row.event_type)
            .ok_or_else(|| AppError::Db(format!("invalid event_type: {}", row.event_type)))?;
        let details = serde_json::from_str(&row.details)
            .map_err(|e| AppError::Db(format!("invalid event details: {e}")))?;

        Ok(Self {
            id: row.id,
            task_id: row.task_id,
            client_id: row.client_id,
            event_type,
            details,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

/// Append an event on an existing connection (usually a transaction).
///
/// # Errors
///
/// Returns `AppError::Db` if the insert fails (including an unknown task).
pub async fn record_in(conn: &mut SqliteConnection, event: &NewEvent) -> Result<Event> {
    let details = serde_json::to_string(&event.details)?;
    let recorded: Event = table::insert_in(
        conn,
        vec![
            ("task_id", event.task_id.into()),
            ("client_id", event.client_id.into()),
            ("event_type", event.event_type.as_str().into()),
            ("details", details.into()),
            ("created_at", format_timestamp(&now()).into()),
        ],
    )
    .await?;

    debug!(
        event_id = recorded.id,
        task_id = recorded.task_id,
        event_type = recorded.event_type.as_str(),
        "event recorded"
    );
    Ok(recorded)
}

/// Attach already-loaded events (newest first) to their tasks, keeping the
/// task order.
fn attach_events(tasks: Vec<Task>, events: Vec<Event>) -> Vec<TaskWithEvents> {
    let mut grouped: HashMap<i64, Vec<Event>> = HashMap::new();
    for event in events {
        grouped.entry(event.task_id).or_default().push(event);
    }
    tasks
        .into_iter()
        .map(|task| {
            let events = grouped.remove(&task.id).unwrap_or_default();
            TaskWithEvents { task, events }
        })
        .collect()
}

/// Tasks selected by `clause` with their events, in two queries.
///
/// `clause` is a `WHERE` clause over `tasks` columns; `args` bind its
/// placeholders.
///
/// # Errors
///
/// Returns `AppError::Db` if either query fails.
pub async fn tasks_with_events_in(
    conn: &mut SqliteConnection,
    clause: &str,
    args: Vec<SqlValue>,
) -> Result<Vec<TaskWithEvents>> {
    let tasks: Vec<Task> = table::select_in(&mut *conn, clause, args.clone(), NEWEST_FIRST).await?;
    let events: Vec<Event> = table::select_in(
        conn,
        &format!("task_id IN (SELECT id FROM tasks WHERE {clause})"),
        args,
        NEWEST_FIRST,
    )
    .await?;
    Ok(attach_events(tasks, events))
}

/// Events for one task, newest first, on an existing connection.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn events_for_task_in(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<Event>> {
    table::select_in(conn, "task_id = ?1", vec![SqlValue::from(task_id)], NEWEST_FIRST).await
}

impl EventRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            table: Table::new(db),
        }
    }

    /// Append an event to an existing task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task does not exist, or
    /// `AppError::Db` if the insert fails.
    pub async fn record_event(&self, event: &NewEvent) -> Result<Event> {
        let mut tx = db::begin_write(self.table.db()).await?;
        if !table::exists_in(&mut tx, Task::TABLE, event.task_id).await? {
            return Err(AppError::NotFound(format!("task {} not found", event.task_id)));
        }
        let recorded = record_in(&mut tx, event).await?;
        tx.commit().await?;
        Ok(recorded)
    }

    /// All events for a task, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn events_for_task(&self, task_id: i64) -> Result<Vec<Event>> {
        self.table
            .find_where("task_id = ?1", vec![SqlValue::from(task_id)], NEWEST_FIRST)
            .await
    }

    /// Every task of a client with its events attached.
    ///
    /// The client's events come back from a single query, grouped by task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either query fails.
    pub async fn tasks_with_events(&self, client_id: i64) -> Result<Vec<TaskWithEvents>> {
        let mut conn = self.table.db().acquire().await?;
        tasks_with_events_in(&mut conn, "client_id = ?1", vec![SqlValue::from(client_id)]).await
    }
}
