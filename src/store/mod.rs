//! Persistence layer: libSQL-backed storage for email tracking records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{CreateOutcome, EmailRecord, RecordStore};
