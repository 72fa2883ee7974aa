//! libSQL backend for `RecordStore`.
//!
//! Supports local file and in-memory databases. The record table name comes
//! from configuration and is validated as an SQL identifier before use.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::config::is_sql_identifier;
use crate::error::DatabaseError;
use crate::pipeline::state::{Disposition, StateTransition};
use crate::store::migrations;
use crate::store::traits::{CreateOutcome, EmailRecord, RecordStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    table: String,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, table: &str) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db, table)?;
        backend.init_schema().await?;
        info!(path = %path.display(), table, "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(table: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db, table)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase, table: &str) -> Result<Self, DatabaseError> {
        if !is_sql_identifier(table) {
            return Err(DatabaseError::Pool(format!("Invalid table name {table:?}")));
        }
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            table: table.to_string(),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// The empty string is the stored form of "never changed".
fn parse_optional_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() { None } else { Some(parse_datetime(s)) }
}

fn parse_disposition(s: &str) -> Result<Disposition, DatabaseError> {
    s.parse()
        .map_err(|e| DatabaseError::Query(format!("corrupt record row: {e}")))
}

/// Map a libsql Row to an EmailRecord.
///
/// Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<EmailRecord, DatabaseError> {
    let read = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
    };
    let received_str = read(1)?;
    let disposition_str = read(2)?;
    let disposition_ts_str = read(3)?;

    Ok(EmailRecord {
        email_id: read(0)?,
        received_ts: parse_datetime(&received_str),
        disposition: parse_disposition(&disposition_str)?,
        disposition_ts: parse_optional_datetime(&disposition_ts_str),
    })
}

const RECORD_COLUMNS: &str = "email_id, received_ts, disposition, disposition_ts";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn(), &self.table).await
    }

    async fn create_record(
        &self,
        email_id: &str,
        received_ts: DateTime<Utc>,
    ) -> Result<CreateOutcome, DatabaseError> {
        let table = &self.table;
        let conn = self.conn();
        let received = Disposition::Received.as_str();

        // Each step is one statement, so concurrent redeliveries of the same
        // key never see a half-written row or a uniqueness failure.
        let inserted = conn
            .execute(
                &format!(
                    "INSERT INTO {table} (email_id, received_ts, disposition, disposition_ts)
                     VALUES (?1, ?2, ?3, '')
                     ON CONFLICT (email_id) DO NOTHING"
                ),
                params![email_id, format_ts(received_ts), received],
            )
            .await
            .map_err(|e| DatabaseError::Constraint(format!("create_record: {e}")))?;

        let outcome = if inserted > 0 {
            CreateOutcome::Created
        } else {
            let refreshed = conn
                .execute(
                    &format!(
                        "UPDATE {table} SET received_ts = ?1
                         WHERE email_id = ?2 AND disposition = ?3"
                    ),
                    params![format_ts(received_ts), email_id, received],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("create_record: {e}")))?;
            if refreshed > 0 {
                CreateOutcome::Refreshed
            } else {
                CreateOutcome::AlreadyReviewed
            }
        };

        debug!(email_id, outcome = ?outcome, "Record created");
        Ok(outcome)
    }

    async fn get_record(&self, email_id: &str) -> Result<Option<EmailRecord>, DatabaseError> {
        let table = &self.table;
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM {table} WHERE email_id = ?1"),
                params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_record: {e}"))),
        }
    }

    async fn update_disposition(
        &self,
        email_id: &str,
        disposition: Disposition,
        disposition_ts: DateTime<Utc>,
    ) -> Result<EmailRecord, DatabaseError> {
        let table = &self.table;
        let current = self
            .get_record(email_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "email_record".into(),
                id: email_id.to_string(),
            })?;

        let invalid = || DatabaseError::InvalidTransition {
            id: email_id.to_string(),
            from: current.disposition.as_str().to_string(),
            to: disposition.as_str().to_string(),
        };
        current.disposition.transition(disposition).map_err(|_| invalid())?;

        // The connection is shared by every request, so no explicit
        // transaction. The guard on the validated state makes the update
        // a single compare-and-set.
        let ts = format_ts(disposition_ts);
        let updated = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {table} SET disposition = ?1, disposition_ts = ?2
                     WHERE email_id = ?3 AND disposition = ?4"
                ),
                params![
                    disposition.as_str(),
                    ts.clone(),
                    email_id,
                    current.disposition.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_disposition: {e}")))?;
        if updated == 0 {
            return Err(invalid());
        }

        // The record is the source of truth; a lost history row is logged only.
        if let Err(e) = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO {table}_transitions (email_id, from_state, to_state, transitioned_at)
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![
                    email_id,
                    current.disposition.as_str(),
                    disposition.as_str(),
                    ts
                ],
            )
            .await
        {
            warn!(email_id, error = %e, "Failed to record disposition history");
        }

        debug!(email_id, from = %current.disposition, to = %disposition, "Disposition updated");
        Ok(EmailRecord {
            disposition,
            disposition_ts: Some(disposition_ts),
            ..current
        })
    }

    async fn list_by_disposition(
        &self,
        disposition: Disposition,
        limit: usize,
    ) -> Result<Vec<EmailRecord>, DatabaseError> {
        let table = &self.table;
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM {table} WHERE disposition = ?1
                     ORDER BY received_ts ASC LIMIT ?2"
                ),
                params![disposition.as_str(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_by_disposition: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_by_disposition: {e}")))?
        {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping record row: {e}"),
            }
        }
        Ok(records)
    }

    async fn list_transitions(
        &self,
        email_id: &str,
    ) -> Result<Vec<StateTransition>, DatabaseError> {
        let table = &self.table;
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT from_state, to_state, transitioned_at FROM {table}_transitions
                     WHERE email_id = ?1 ORDER BY id ASC"
                ),
                params![email_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_transitions: {e}")))?;

        let mut transitions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_transitions: {e}")))?
        {
            let from: String = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            let to: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            let at: String = row
                .get(2)
                .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
            transitions.push(StateTransition {
                from: parse_disposition(&from)?,
                to: parse_disposition(&to)?,
                timestamp: parse_datetime(&at),
            });
        }
        Ok(transitions)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
