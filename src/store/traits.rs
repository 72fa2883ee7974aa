//! `RecordStore` trait, the single async interface for email record persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::pipeline::state::{Disposition, StateTransition};

/// Tracking state of one inbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailRecord {
    /// Last path segment of the raw message's object key.
    pub email_id: String,
    pub received_ts: DateTime<Utc>,
    pub disposition: Disposition,
    /// `None` until the first disposition change.
    pub disposition_ts: Option<DateTime<Utc>>,
}

/// What `create_record` did with a (possibly redelivered) intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    /// No record existed; a new one was inserted.
    Created,
    /// A record existed and was still received; `received_ts` was overwritten.
    Refreshed,
    /// A record existed and is already under review; nothing was written.
    AlreadyReviewed,
}

/// Backend-agnostic storage for email records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Create the record for a newly received email.
    ///
    /// Redelivery of the same `email_id` overwrites the record only while it
    /// is still [`Disposition::Received`].
    async fn create_record(
        &self,
        email_id: &str,
        received_ts: DateTime<Utc>,
    ) -> Result<CreateOutcome, DatabaseError>;

    /// Get a record by email ID.
    async fn get_record(&self, email_id: &str) -> Result<Option<EmailRecord>, DatabaseError>;

    /// Advance a record's disposition. Illegal transitions are rejected.
    async fn update_disposition(
        &self,
        email_id: &str,
        disposition: Disposition,
        disposition_ts: DateTime<Utc>,
    ) -> Result<EmailRecord, DatabaseError>;

    /// Records in the given state, oldest first.
    async fn list_by_disposition(
        &self,
        disposition: Disposition,
        limit: usize,
    ) -> Result<Vec<EmailRecord>, DatabaseError>;

    /// Transition history of a record, oldest first.
    async fn list_transitions(&self, email_id: &str)
    -> Result<Vec<StateTransition>, DatabaseError>;
}
