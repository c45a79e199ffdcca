//! Task repository for `SQLite` persistence.

use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::info;

use crate::models::event::{Event, NewEvent, TaskWithEvents};
use crate::models::task::{
    NewTask, ServiceCategory, Task, TaskPatch, TaskStatus, TaskType, Urgency,
};
use crate::models::{format_timestamp, now, parse_timestamp};
use crate::{AppError, Result};

use super::client_repo;
use super::db::{self, Database};
use super::dependency_repo;
use super::event_repo;
use super::table::{self, Columns, Mapping, SqlValue, Table};

/// Newest first; the id breaks ties between equal timestamps.
const NEWEST_FIRST: &str = "created_at DESC, id DESC";

/// Repository wrapper around `SQLite` for task records.
#[derive(Clone)]
pub struct TaskRepo {
    table: Table<Task>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub struct TaskRow {
    id: i64,
    client_id: i64,
    #[sqlx(rename = "type")]
    task_type: String,
    service_category: String,
    urgency: String,
    status: String,
    title: String,
    description: Option<String>,
    created_at: String,
}

impl Mapping for Task {
    const TABLE: &'static str = "tasks";
    type Row = TaskRow;

    fn from_row(row: TaskRow) -> Result<Self> {
        let task_type = TaskType::parse(&row.task_type)
            .ok_or_else(|| AppError::Db(format!("invalid task type: {}", row.task_type)))?;
        let service_category = ServiceCategory::parse(&row.service_category).ok_or_else(|| {
            AppError::Db(format!("invalid service category: {}", row.service_category))
        })?;
        let urgency = Urgency::parse(&row.urgency)
            .ok_or_else(|| AppError::Db(format!("invalid urgency: {}", row.urgency)))?;
        let status = TaskStatus::parse(&row.status)
            .ok_or_else(|| AppError::Db(format!("invalid task status: {}", row.status)))?;

        Ok(Self {
            id: row.id,
            client_id: row.client_id,
            task_type,
            service_category,
            urgency,
            status,
            title: row.title,
            description: row.description,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

fn insert_columns(task: &NewTask) -> Columns {
    vec![
        ("client_id", task.client_id.into()),
        ("type", task.task_type.as_str().into()),
        ("service_category", task.service_category.as_str().into()),
        ("urgency", task.urgency.as_str().into()),
        ("status", task.status.as_str().into()),
        ("title", task.title.clone().into()),
        ("description", task.description.clone().into()),
        ("created_at", format_timestamp(&now()).into()),
    ]
}

fn patch_columns(patch: &TaskPatch) -> Columns {
    let mut columns: Columns = Vec::new();
    if let Some(v) = patch.task_type {
        columns.push(("type", v.as_str().into()));
    }
    if let Some(v) = patch.service_category {
        columns.push(("service_category", v.as_str().into()));
    }
    if let Some(v) = patch.urgency {
        columns.push(("urgency", v.as_str().into()));
    }
    if let Some(v) = patch.status {
        columns.push(("status", v.as_str().into()));
    }
    if let Some(ref v) = patch.title {
        columns.push(("title", v.clone().into()));
    }
    if let Some(ref v) = patch.description {
        columns.push(("description", v.clone().into()));
    }
    columns
}

/// Insert a task on an existing connection without recording any event.
///
/// # Errors
///
/// Returns `AppError::Db` if the insert fails (including an unknown client).
pub async fn insert_in(conn: &mut SqliteConnection, task: &NewTask) -> Result<Task> {
    table::insert_in(conn, insert_columns(task)).await
}

/// Fetch a task or fail with `NotFound`.
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown task or `AppError::Db` if the
/// lookup fails.
pub async fn require_in(conn: &mut SqliteConnection, id: i64) -> Result<Task> {
    table::find_by_id_in(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))
}

/// `WHERE` clause and bindings for the optional list filters.
fn filter_clause(client_id: Option<i64>, status: Option<TaskStatus>) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<SqlValue> = Vec::new();
    if let Some(id) = client_id {
        args.push(id.into());
        clauses.push(format!("client_id = ?{}", args.len()));
    }
    if let Some(st) = status {
        args.push(st.as_str().into());
        clauses.push(format!("status = ?{}", args.len()));
    }
    let clause = if clauses.is_empty() {
        "1 = 1".to_owned()
    } else {
        clauses.join(" AND ")
    };
    (clause, args)
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            table: Table::new(db),
        }
    }

    /// Insert a task for an existing client.
    ///
    /// Operator-created tasks start with an empty history; only ingestion
    /// records `TASK_CREATED`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the client does not exist, or
    /// `AppError::Db` if persistence fails.
    pub async fn create(&self, task: &NewTask) -> Result<Task> {
        let mut tx = db::begin_write(self.table.db()).await?;
        client_repo::ensure_exists_in(&mut tx, task.client_id).await?;

        let created = insert_in(&mut tx, task).await?;
        tx.commit().await?;

        info!(task_id = created.id, client_id = created.client_id, "task created");
        Ok(created)
    }

    /// Retrieve a task by identifier; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Task>> {
        self.table.find_by_id(id).await
    }

    /// List every task, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_all(&self) -> Result<Vec<Task>> {
        self.find_filtered(None, None).await
    }

    /// Tasks owned by one client, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_client_id(&self, client_id: i64) -> Result<Vec<Task>> {
        self.find_filtered(Some(client_id), None).await
    }

    /// Tasks in one status, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.find_filtered(None, Some(status)).await
    }

    /// Tasks matching every supplied filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_filtered(
        &self,
        client_id: Option<i64>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        let (clause, args) = filter_clause(client_id, status);
        self.table.find_where(&clause, args, NEWEST_FIRST).await
    }

    /// Apply a partial update and return the re-read task.
    ///
    /// A status change records a `STATUS_CHANGE` event in the same
    /// transaction. Moving to `closed` is refused while any required task
    /// is still open. Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` (field `status`) when closing a task
    /// with open requirements, or `AppError::Db` if persistence fails.
    pub async fn update(&self, id: i64, patch: &TaskPatch) -> Result<Option<Task>> {
        let mut tx = db::begin_write(self.table.db()).await?;

        let Some(current) = table::find_by_id_in::<Task>(&mut tx, id).await? else {
            return Ok(None);
        };

        let status_change = patch.status.filter(|to| *to != current.status);
        if status_change == Some(TaskStatus::Closed) {
            let open = dependency_repo::open_requirements_in(&mut tx, id).await?;
            if !open.is_empty() {
                let ids: Vec<String> = open.iter().map(i64::to_string).collect();
                return Err(AppError::invalid_field(
                    format!(
                        "task {id} cannot be closed while required tasks are open: {}",
                        ids.join(", ")
                    ),
                    "status",
                ));
            }
        }

        let updated: Option<Task> = table::update_in(&mut tx, id, patch_columns(patch)).await?;
        if let (Some(task), Some(to)) = (&updated, status_change) {
            event_repo::record_in(&mut tx, &NewEvent::status_change(task, current.status, to))
                .await?;
            info!(
                task_id = id,
                from = current.status.as_str(),
                to = to.as_str(),
                "task status changed"
            );
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Append an operator comment to a task's history.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the task does not exist, or
    /// `AppError::Db` if the insert fails.
    pub async fn add_comment(&self, id: i64, body: &str) -> Result<Event> {
        let mut tx = db::begin_write(self.table.db()).await?;
        let task = require_in(&mut tx, id).await?;
        let event = event_repo::record_in(&mut tx, &NewEvent::comment(&task, body)).await?;
        tx.commit().await?;
        Ok(event)
    }

    /// Delete a task and its messages, events, and dependency edges.
    ///
    /// Documents referencing the task or its events are detached rather than
    /// deleted. Returns `Ok(false)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement fails; nothing is committed.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = db::begin_write(self.table.db()).await?;

        if !table::exists_in(&mut tx, Task::TABLE, id).await? {
            return Ok(false);
        }

        let statements = [
            "DELETE FROM task_dependencies WHERE dependent_task_id = ?1 OR required_task_id = ?1",
            "DELETE FROM messages WHERE task_id = ?1",
            "UPDATE documents SET event_id = NULL
             WHERE event_id IN (SELECT id FROM events WHERE task_id = ?1)",
            "DELETE FROM events WHERE task_id = ?1",
            "UPDATE documents SET task_id = NULL WHERE task_id = ?1",
        ];
        for sql in statements {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }

        let deleted = table::delete_in::<Task>(&mut tx, id).await?;
        tx.commit().await?;

        info!(task_id = id, "task deleted with related records");
        Ok(deleted)
    }

    /// A task with its full event history; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either query fails.
    pub async fn with_events(&self, id: i64) -> Result<Option<TaskWithEvents>> {
        let mut conn = self.table.db().acquire().await?;
        let Some(task) = table::find_by_id_in::<Task>(&mut conn, id).await? else {
            return Ok(None);
        };
        let events = event_repo::events_for_task_in(&mut conn, id).await?;
        Ok(Some(TaskWithEvents { task, events }))
    }

    /// Every task matching the filters, each with its event history.
    ///
    /// Events for all matched tasks are loaded with one query.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either query fails.
    pub async fn find_filtered_with_events(
        &self,
        client_id: Option<i64>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskWithEvents>> {
        let (clause, args) = filter_clause(client_id, status);
        let mut conn = self.table.db().acquire().await?;
        event_repo::tasks_with_events_in(&mut conn, &clause, args).await
    }
}
