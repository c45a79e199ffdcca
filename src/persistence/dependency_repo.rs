//! Task dependency repository: directed "cannot close until" edges.

use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::info;

use crate::models::dependency::TaskDependency;
use crate::models::event::NewEvent;
use crate::models::task::Task;
use crate::models::{format_timestamp, now, parse_timestamp};
use crate::{AppError, Result};

use super::db::{self, Database};
use super::event_repo;
use super::table::{self, Mapping, SqlValue, Table};

/// Repository for task dependency edges.
#[derive(Clone)]
pub struct DependencyRepo {
    table: Table<TaskDependency>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub struct DependencyRow {
    id: i64,
    dependent_task_id: i64,
    required_task_id: i64,
    created_at: String,
}

impl Mapping for TaskDependency {
    const TABLE: &'static str = "task_dependencies";
    type Row = DependencyRow;

    fn from_row(row: DependencyRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            dependent_task_id: row.dependent_task_id,
            required_task_id: row.required_task_id,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

/// Ids of tasks `task_id` requires that are not yet closed.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn open_requirements_in(conn: &mut SqliteConnection, task_id: i64) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT t.id FROM task_dependencies d
         JOIN tasks t ON t.id = d.required_task_id
         WHERE d.dependent_task_id = ?1 AND t.status <> 'closed'
         ORDER BY t.id",
    )
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Whether `from` already reaches `to` by following required-task edges.
async fn reaches_in(conn: &mut SqliteConnection, from: i64, to: i64) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "WITH RECURSIVE upstream(id) AS (
             SELECT required_task_id FROM task_dependencies WHERE dependent_task_id = ?1
             UNION
             SELECT d.required_task_id FROM task_dependencies d
             JOIN upstream u ON d.dependent_task_id = u.id
         )
         SELECT id FROM upstream WHERE id = ?2 LIMIT 1",
    )
    .bind(from)
    .bind(to)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.is_some())
}

impl DependencyRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            table: Table::new(db),
        }
    }

    /// Record that `dependent_task_id` cannot close until `required_task_id` closes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a self-loop, a duplicate edge, or an
    /// edge that would close a cycle; `AppError::NotFound` if either task is
    /// missing; `AppError::Db` if persistence fails.
    pub async fn add(&self, dependent_task_id: i64, required_task_id: i64) -> Result<TaskDependency> {
        if dependent_task_id == required_task_id {
            return Err(AppError::invalid_field(
                "a task cannot depend on itself",
                "requiredTaskId",
            ));
        }

        let mut tx = db::begin_write(self.table.db()).await?;

        let dependent: Task = table::find_by_id_in(&mut tx, dependent_task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task {dependent_task_id} not found")))?;
        if !table::exists_in(&mut tx, Task::TABLE, required_task_id).await? {
            return Err(AppError::NotFound(format!(
                "task {required_task_id} not found"
            )));
        }

        let existing: Option<TaskDependency> = table::select_one_in(
            &mut tx,
            "dependent_task_id = ?1 AND required_task_id = ?2",
            vec![
                SqlValue::from(dependent_task_id),
                SqlValue::from(required_task_id),
            ],
        )
        .await?;
        if existing.is_some() {
            return Err(AppError::invalid_field(
                "dependency already exists",
                "requiredTaskId",
            ));
        }

        if reaches_in(&mut tx, required_task_id, dependent_task_id).await? {
            return Err(AppError::invalid_field(
                "dependency would create a cycle",
                "requiredTaskId",
            ));
        }

        let edge: TaskDependency = table::insert_in(
            &mut tx,
            vec![
                ("dependent_task_id", dependent_task_id.into()),
                ("required_task_id", required_task_id.into()),
                ("created_at", format_timestamp(&now()).into()),
            ],
        )
        .await?;
        event_repo::record_in(&mut tx, &NewEvent::dependency(&dependent, required_task_id, true))
            .await?;
        tx.commit().await?;

        info!(dependent_task_id, required_task_id, "dependency added");
        Ok(edge)
    }

    /// Remove an edge; `Ok(false)` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if persistence fails.
    pub async fn remove(&self, dependent_task_id: i64, required_task_id: i64) -> Result<bool> {
        let mut tx = db::begin_write(self.table.db()).await?;

        let result = sqlx::query(
            "DELETE FROM task_dependencies WHERE dependent_task_id = ?1 AND required_task_id = ?2",
        )
        .bind(dependent_task_id)
        .bind(required_task_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if let Some(dependent) = table::find_by_id_in::<Task>(&mut tx, dependent_task_id).await? {
            event_repo::record_in(
                &mut tx,
                &NewEvent::dependency(&dependent, required_task_id, false),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Edges where `task_id` is the waiting side.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn requirements_of(&self, task_id: i64) -> Result<Vec<TaskDependency>> {
        self.table
            .find_where(
                "dependent_task_id = ?1",
                vec![SqlValue::from(task_id)],
                "id ASC",
            )
            .await
    }

    /// Edges where `task_id` is the prerequisite.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn dependents_of(&self, task_id: i64) -> Result<Vec<TaskDependency>> {
        self.table
            .find_where(
                "required_task_id = ?1",
                vec![SqlValue::from(task_id)],
                "id ASC",
            )
            .await
    }
}
