//! Client repository for `SQLite` persistence.

use std::sync::Arc;

use sqlx::SqliteConnection;
use tracing::info;

use crate::models::client::{ordered_services, Client, ClientPatch, NewClient};
use crate::models::task::ServiceCategory;
use crate::models::{format_timestamp, now, parse_timestamp};
use crate::{AppError, Result};

use super::db::{self, Database};
use super::table::{self, Columns, Mapping, SqlValue, Table};

/// Repository wrapper around `SQLite` for client records.
#[derive(Clone)]
pub struct ClientRepo {
    table: Table<Client>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
pub struct ClientRow {
    id: i64,
    organization_name: String,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    services: String,
    created_at: String,
}

impl Mapping for Client {
    const TABLE: &'static str = "clients";
    type Row = ClientRow;

    fn from_row(row: ClientRow) -> Result<Self> {
        let codes: Vec<String> = serde_json::from_str(&row.services)
            .map_err(|e| AppError::Db(format!("invalid services: {e}")))?;
        let services = codes
            .iter()
            .map(|code| {
                ServiceCategory::parse(code)
                    .ok_or_else(|| AppError::Db(format!("invalid service category: {code}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: row.id,
            organization_name: row.organization_name,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            services,
            created_at: parse_timestamp("created_at", &row.created_at)?,
        })
    }
}

fn services_json(services: &[ServiceCategory]) -> Result<String> {
    let codes: Vec<&str> = ordered_services(services)
        .into_iter()
        .map(ServiceCategory::as_str)
        .collect();
    Ok(serde_json::to_string(&codes)?)
}

/// Entity → column half of the mapping pair for inserts.
fn insert_columns(client: &NewClient) -> Result<Columns> {
    Ok(vec![
        ("organization_name", client.organization_name.clone().into()),
        ("first_name", client.first_name.clone().into()),
        ("last_name", client.last_name.clone().into()),
        ("email", client.email.clone().into()),
        ("phone", client.phone.clone().into()),
        ("services", services_json(&client.services)?.into()),
        ("created_at", format_timestamp(&now()).into()),
    ])
}

/// Entity → column half of the mapping pair for partial updates.
fn patch_columns(patch: &ClientPatch) -> Result<Columns> {
    let mut columns: Columns = Vec::new();
    if let Some(ref v) = patch.organization_name {
        columns.push(("organization_name", v.clone().into()));
    }
    if let Some(ref v) = patch.first_name {
        columns.push(("first_name", v.clone().into()));
    }
    if let Some(ref v) = patch.last_name {
        columns.push(("last_name", v.clone().into()));
    }
    if let Some(ref v) = patch.email {
        columns.push(("email", v.clone().into()));
    }
    if let Some(ref v) = patch.phone {
        columns.push(("phone", v.clone().into()));
    }
    if let Some(ref v) = patch.services {
        columns.push(("services", services_json(v)?.into()));
    }
    Ok(columns)
}

/// Reject an email already owned by a different client.
async fn ensure_email_free(
    conn: &mut SqliteConnection,
    email: &str,
    except_id: Option<i64>,
) -> Result<()> {
    let owner: Option<Client> =
        table::select_one_in(conn, "email = ?1", vec![SqlValue::from(email)]).await?;
    match owner {
        Some(existing) if Some(existing.id) != except_id => Err(AppError::invalid_field(
            format!("email {email} is already registered"),
            "email",
        )),
        _ => Ok(()),
    }
}

/// Fail with `NotFound` unless client `id` exists.
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown client or `AppError::Db` if
/// the lookup fails.
pub async fn ensure_exists_in(conn: &mut SqliteConnection, id: i64) -> Result<()> {
    if table::exists_in(conn, Client::TABLE, id).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("client {id} not found")))
    }
}

impl ClientRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            table: Table::new(db),
        }
    }

    /// Insert a new client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the email is already registered, or
    /// `AppError::Db` if the insert fails.
    pub async fn create(&self, client: &NewClient) -> Result<Client> {
        let mut tx = db::begin_write(self.table.db()).await?;
        ensure_email_free(&mut tx, &client.email, None).await?;
        let created: Client = table::insert_in(&mut tx, insert_columns(client)?).await?;
        tx.commit().await?;

        info!(client_id = created.id, "client created");
        Ok(created)
    }

    /// Retrieve a client by identifier; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Client>> {
        self.table.find_by_id(id).await
    }

    /// List every client ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_all(&self) -> Result<Vec<Client>> {
        self.table.find_all().await
    }

    /// Look up the client that owns `email` (exact, case-sensitive match).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Client>> {
        self.table
            .find_one_where("email = ?1", vec![SqlValue::from(email)])
            .await
    }

    /// Apply a partial update and return the re-read client.
    ///
    /// Returns `Ok(None)` if the client does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` if the new email belongs to another
    /// client, or `AppError::Db` if the update fails.
    pub async fn update(&self, id: i64, patch: &ClientPatch) -> Result<Option<Client>> {
        let mut tx = db::begin_write(self.table.db()).await?;
        if let Some(ref email) = patch.email {
            ensure_email_free(&mut tx, email, Some(id)).await?;
        }
        let updated: Option<Client> = table::update_in(&mut tx, id, patch_columns(patch)?).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Delete a client and everything that hangs off it, in one transaction.
    ///
    /// Removes the client's dependency edges, messages, events, and tasks,
    /// and detaches documents that reference the client or its tasks.
    /// Returns `Ok(false)` if the client does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if any statement fails; nothing is committed.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = db::begin_write(self.table.db()).await?;

        if !table::exists_in(&mut tx, Client::TABLE, id).await? {
            return Ok(false);
        }

        let statements = [
            "DELETE FROM task_dependencies
             WHERE dependent_task_id IN (SELECT id FROM tasks WHERE client_id = ?1)
                OR required_task_id IN (SELECT id FROM tasks WHERE client_id = ?1)",
            "DELETE FROM messages
             WHERE client_id = ?1 OR task_id IN (SELECT id FROM tasks WHERE client_id = ?1)",
            "UPDATE documents SET event_id = NULL
             WHERE event_id IN (SELECT id FROM events
                                WHERE client_id = ?1
                                   OR task_id IN (SELECT id FROM tasks WHERE client_id = ?1))",
            "DELETE FROM events
             WHERE client_id = ?1 OR task_id IN (SELECT id FROM tasks WHERE client_id = ?1)",
            "UPDATE documents SET task_id = NULL
             WHERE task_id IN (SELECT id FROM tasks WHERE client_id = ?1)",
            "DELETE FROM tasks WHERE client_id = ?1",
            "UPDATE documents SET client_id = NULL WHERE client_id = ?1",
        ];
        for sql in statements {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }

        let deleted = table::delete_in::<Client>(&mut tx, id).await?;
        tx.commit().await?;

        info!(client_id = id, "client deleted with related records");
        Ok(deleted)
    }
}
