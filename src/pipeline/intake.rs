//! Intake recorder: fetch a newly arrived email and create its record.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::objects::ObjectStore;
use crate::pipeline::types::{IntakeOutput, ObjectRef};
use crate::store::{CreateOutcome, RecordStore};

/// Derive the email ID from an object key: its last `/` segment.
pub fn email_id_from_key(key: &str) -> Option<&str> {
    key.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Records the arrival of each inbound email.
pub struct IntakeRecorder {
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
}

impl IntakeRecorder {
    pub fn new(objects: Arc<dyn ObjectStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { objects, records }
    }

    /// Fetch the raw email at `source` and create its tracking record.
    ///
    /// The fetch happens first, so a missing object never leaves a record
    /// behind. A failed record write is returned, not swallowed.
    pub async fn handle(&self, source: &ObjectRef) -> Result<IntakeOutput, PipelineError> {
        let ObjectRef { bucket, key } = source;
        info!(stage = "intake", bucket = %bucket, key = %key, "Email object received");

        let email_id = email_id_from_key(key)
            .ok_or_else(|| PipelineError::InvalidEvent(format!("object key {key:?} has no name")))?
            .to_string();

        let bytes = self.objects.fetch(bucket, key).await.map_err(|e| {
            error!(stage = "intake", bucket = %bucket, key = %key, error = %e, "Fetch failed");
            PipelineError::Fetch {
                bucket: bucket.clone(),
                key: key.clone(),
                source: e,
            }
        })?;
        let email = String::from_utf8(bytes).map_err(|_| PipelineError::NotText {
            bucket: bucket.clone(),
            key: key.clone(),
        })?;

        let received_ts = Utc::now();
        let outcome = self
            .records
            .create_record(&email_id, received_ts)
            .await
            .map_err(|e| {
                error!(stage = "intake", email_id = %email_id, key = %key, error = %e, "Record write failed");
                PipelineError::RecordWrite {
                    email_id: email_id.clone(),
                    source: e,
                }
            })?;

        match outcome {
            CreateOutcome::AlreadyReviewed => {
                warn!(stage = "intake", email_id = %email_id, "Redelivered email already under review");
                return Err(PipelineError::AlreadyReviewed { email_id });
            }
            CreateOutcome::Refreshed => {
                info!(stage = "intake", email_id = %email_id, "Redelivered email, received_ts refreshed");
            }
            CreateOutcome::Created => {
                info!(stage = "intake", email_id = %email_id, received_ts = %received_ts, "Record created");
            }
        }

        Ok(IntakeOutput {
            email_id,
            received_ts,
            email,
            outcome,
        })
    }
}
