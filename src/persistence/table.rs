//! Generic single-table repository driven by a row/entity mapping pair.
//!
//! Entity types implement [`Mapping`] (row → entity); each concrete
//! repository supplies the entity → column list direction when it
//! inserts or patches. The `*_in` functions take a plain connection so
//! callers can compose them inside one transaction.

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use crate::Result;

use super::db::Database;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// `INTEGER` or `NULL`.
    Int(Option<i64>),
    /// `TEXT` or `NULL`.
    Text(Option<String>),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(Some(value))
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(value: Option<i64>) -> Self {
        Self::Int(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(Some(value))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(Some(value.to_owned()))
    }
}

/// Ordered `(column, value)` pairs produced from an entity or patch.
pub type Columns = Vec<(&'static str, SqlValue)>;

/// Row → entity half of the mapping pair.
pub trait Mapping: Sized + Send + Unpin {
    /// Backing table name.
    const TABLE: &'static str;
    /// Raw row shape as stored.
    type Row: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin;

    /// Convert a stored row into the domain entity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if a column holds an unrecognized value.
    fn from_row(row: Self::Row) -> Result<Self>;
}

/// Pool-backed handle for the generic reads every entity supports.
pub struct Table<E> {
    db: Arc<Database>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            _entity: PhantomData,
        }
    }
}

impl<E: Mapping> Table<E> {
    /// Create a table handle over the shared pool.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }

    /// Underlying pool, for repositories that open their own transactions.
    #[must_use]
    pub fn db(&self) -> &Database {
        self.db.as_ref()
    }

    /// Fetch one entity; `Ok(None)` when absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<E>> {
        let mut conn = self.db.acquire().await?;
        find_by_id_in(&mut conn, id).await
    }

    /// Fetch every entity ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_all(&self) -> Result<Vec<E>> {
        self.find_where("1 = 1", Vec::new(), "id ASC").await
    }

    /// Fetch entities matching a `WHERE` clause with positional arguments.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_where(
        &self,
        clause: &str,
        args: Vec<SqlValue>,
        order_by: &str,
    ) -> Result<Vec<E>> {
        let mut conn = self.db.acquire().await?;
        select_in(&mut conn, clause, args, order_by).await
    }

    /// Fetch the first entity matching a `WHERE` clause.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn find_one_where(&self, clause: &str, args: Vec<SqlValue>) -> Result<Option<E>> {
        let mut conn = self.db.acquire().await?;
        select_one_in(&mut conn, clause, args).await
    }
}

/// Fetch one entity by id on an existing connection.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn find_by_id_in<E: Mapping>(conn: &mut SqliteConnection, id: i64) -> Result<Option<E>> {
    select_one_in(conn, "id = ?1", vec![SqlValue::from(id)]).await
}

/// Fetch entities matching `clause` on an existing connection.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn select_in<E: Mapping>(
    conn: &mut SqliteConnection,
    clause: &str,
    args: Vec<SqlValue>,
    order_by: &str,
) -> Result<Vec<E>> {
    let sql = format!("SELECT * FROM {} WHERE {clause} ORDER BY {order_by}", E::TABLE);
    let mut query = sqlx::query_as::<_, E::Row>(&sql);
    for value in args {
        query = match value {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
    }
    let rows = query.fetch_all(&mut *conn).await?;
    rows.into_iter().map(E::from_row).collect()
}

/// Fetch the first entity matching `clause` on an existing connection.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn select_one_in<E: Mapping>(
    conn: &mut SqliteConnection,
    clause: &str,
    args: Vec<SqlValue>,
) -> Result<Option<E>> {
    let sql = format!("SELECT * FROM {} WHERE {clause} LIMIT 1", E::TABLE);
    let mut query = sqlx::query_as::<_, E::Row>(&sql);
    for value in args {
        query = match value {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
    }
    let row = query.fetch_optional(&mut *conn).await?;
    row.map(E::from_row).transpose()
}

/// Insert a row built from `columns` and return the stored entity.
///
/// # Errors
///
/// Returns `AppError::Db` if the insert violates a constraint or fails.
pub async fn insert_in<E: Mapping>(conn: &mut SqliteConnection, columns: Columns) -> Result<E> {
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        E::TABLE,
        names.join(", "),
        placeholders.join(", ")
    );

    let mut query = sqlx::query_as::<_, E::Row>(&sql);
    for (_, value) in columns {
        query = match value {
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
    }
    let row = query.fetch_one(&mut *conn).await?;
    E::from_row(row)
}

/// Apply a partial update and return the canonical post-update entity.
///
/// Returns `Ok(None)` when no row has `id`. An empty column list is a
/// plain re-read.
///
/// # Errors
///
/// Returns `AppError::Db` if the update violates a constraint or fails.
pub async fn update_in<E: Mapping>(
    conn: &mut SqliteConnection,
    id: i64,
    columns: Columns,
) -> Result<Option<E>> {
    if !columns.is_empty() {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{name} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            E::TABLE,
            assignments.join(", "),
            columns.len() + 1
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in columns {
            query = match value {
                SqlValue::Int(v) => query.bind(v),
                SqlValue::Text(v) => query.bind(v),
            };
        }
        let result = query.bind(id).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
    }

    find_by_id_in(conn, id).await
}

/// Delete one row by id; `Ok(false)` when absent.
///
/// # Errors
///
/// Returns `AppError::Db` if the delete violates a constraint or fails.
pub async fn delete_in<E: Mapping>(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", E::TABLE);
    let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
    Ok(result.rows_affected() > 0)
}

/// Whether a row with `id` exists in `table`.
///
/// # Errors
///
/// Returns `AppError::Db` if the query fails.
pub async fn exists_in(conn: &mut SqliteConnection, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {table} WHERE id = ?1");
    let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}
