//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! The record table name is configurable, so migration SQL is a template
//! with `{table}` placeholders and versions are tracked per table.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "email_records",
        sql: r#"
            CREATE TABLE IF NOT EXISTS {table} (
                email_id TEXT PRIMARY KEY,
                received_ts TEXT NOT NULL,
                disposition TEXT NOT NULL DEFAULT '',
                disposition_ts TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_disposition ON {table}(disposition);
        "#,
    },
    Migration {
        version: 2,
        name: "disposition_history",
        sql: r#"
            CREATE TABLE IF NOT EXISTS {table}_transitions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email_id TEXT NOT NULL REFERENCES {table}(email_id) ON DELETE CASCADE,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                transitioned_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_transitions_email
                ON {table}_transitions(email_id);
        "#,
    },
];

/// Latest schema version.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Create the tracking table and apply every migration newer than the
/// recorded version for `table`.
pub async fn run_migrations(conn: &Connection, table: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            scope TEXT NOT NULL,
            version INTEGER NOT NULL,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope, version)
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn, table).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                table,
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            let sql = migration.sql.replace("{table}", table);
            conn.execute_batch(&sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, table, migration.version, migration.name).await?;
        }
    }

    tracing::debug!(table, version = latest_version(), "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version for `table`, or 0 if none.
async fn get_current_version(conn: &Connection, table: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations WHERE scope = ?1",
            libsql::params![table],
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(
    conn: &Connection,
    table: &str,
    version: i64,
    name: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (scope, version, name) VALUES (?1, ?2, ?3)",
        libsql::params![table, version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
