//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so bootstrap is
//! safe to re-run on every server startup.

use sqlx::SqlitePool;
use tracing::info;

use crate::Result;

/// Tables in drop order (dependents before the tables they reference).
pub const DROP_TABLE_ORDER: [&str; 8] = [
    "document_versions",
    "documents",
    "messages",
    "task_dependencies",
    "events",
    "tasks",
    "clients",
    "users",
];

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS clients (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_name TEXT NOT NULL,
    first_name        TEXT NOT NULL,
    last_name         TEXT NOT NULL,
    email             TEXT NOT NULL UNIQUE,
    phone             TEXT,
    services          TEXT NOT NULL DEFAULT '[]',
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id        INTEGER NOT NULL REFERENCES clients(id),
    type             TEXT NOT NULL CHECK(type IN ('FEATURE_REQUEST','BUG','REVISION','RESEARCH','QUESTION')),
    service_category TEXT NOT NULL CHECK(service_category IN ('STRATEGY','DESIGN','DEV','CONSULT')),
    urgency          TEXT NOT NULL CHECK(urgency IN ('urgent','medium','low')),
    status           TEXT NOT NULL CHECK(status IN ('open','blocked','in_progress','needs_review','needs_client_review','closed')),
    title            TEXT NOT NULL,
    description      TEXT,
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id   INTEGER NOT NULL REFERENCES clients(id),
    task_id     INTEGER REFERENCES tasks(id),
    direction   TEXT NOT NULL CHECK(direction IN ('inbound','outbound')),
    body        TEXT NOT NULL,
    status      TEXT NOT NULL CHECK(status IN ('draft','sent')),
    sent_at     TEXT,
    subject     TEXT,
    external_id TEXT,
    thread_id   TEXT,
    created_at  TEXT NOT NULL,
    CHECK ((status = 'draft' AND sent_at IS NULL) OR (status = 'sent' AND sent_at IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id    INTEGER NOT NULL REFERENCES tasks(id),
    client_id  INTEGER REFERENCES clients(id),
    event_type TEXT NOT NULL,
    details    TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_dependencies (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    dependent_task_id INTEGER NOT NULL REFERENCES tasks(id),
    required_task_id  INTEGER NOT NULL REFERENCES tasks(id),
    created_at        TEXT NOT NULL,
    UNIQUE (dependent_task_id, required_task_id),
    CHECK (dependent_task_id <> required_task_id)
);

CREATE TABLE IF NOT EXISTS users (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    email              TEXT NOT NULL UNIQUE,
    role               TEXT NOT NULL DEFAULT 'operator',
    magic_link_token   TEXT,
    magic_link_expires TEXT,
    last_login_at      TEXT,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id             INTEGER REFERENCES tasks(id),
    client_id           INTEGER REFERENCES clients(id),
    event_id            INTEGER REFERENCES events(id),
    file_name           TEXT NOT NULL,
    file_type           TEXT NOT NULL,
    s3_key              TEXT NOT NULL UNIQUE,
    uploaded_by_user_id INTEGER REFERENCES users(id),
    uploaded_at         TEXT NOT NULL,
    description         TEXT
);

CREATE TABLE IF NOT EXISTS document_versions (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id    INTEGER NOT NULL REFERENCES documents(id),
    version_number INTEGER NOT NULL,
    s3_key         TEXT NOT NULL,
    uploaded_at    TEXT NOT NULL,
    description    TEXT,
    UNIQUE (document_id, version_number)
);

CREATE INDEX IF NOT EXISTS idx_tasks_client ON tasks(client_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_messages_client ON messages(client_id);
CREATE INDEX IF NOT EXISTS idx_messages_task ON messages(task_id);
DROP INDEX IF EXISTS idx_messages_external_id;
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_external
    ON messages(client_id, external_id);
CREATE INDEX IF NOT EXISTS idx_events_task ON events(task_id, created_at);
CREATE INDEX IF NOT EXISTS idx_events_client ON events(client_id);
CREATE INDEX IF NOT EXISTS idx_dependencies_required ON task_dependencies(required_task_id);
CREATE INDEX IF NOT EXISTS idx_documents_client ON documents(client_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}

/// Drop every table and re-create the schema from scratch.
///
/// # Errors
///
/// Returns `AppError::Db` if any statement fails; the drop runs in one
/// transaction so a failure leaves the previous schema intact.
pub async fn reset_schema(pool: &SqlitePool) -> Result<()> {
    let mut tx = super::db::begin_write(pool).await?;
    for table in DROP_TABLE_ORDER {
        // `table` comes from the constant list above.
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    bootstrap_schema(pool).await?;
    info!("schema reset");
    Ok(())
}
