//! Event, input and output structures of the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::pipeline::state::Disposition;
use crate::store::CreateOutcome;

// ── Object-created events ───────────────────────────────────────────

/// Location of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

/// Notification that an object was created or removed.
///
/// Both the event-bus shape (`detail`) and the storage notification
/// shape (`Records`) are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ObjectEvent {
    EventBus {
        detail: EventDetail,
    },
    Notification {
        #[serde(rename = "Records")]
        records: Vec<NotificationRecord>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventDetail {
    pub bucket: NamedBucket,
    pub object: ObjectKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRecord {
    pub s3: EventDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedBucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectKey {
    pub key: String,
}

impl ObjectEvent {
    /// Parse an event payload of either shape.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PipelineError> {
        serde_json::from_value(value)
            .map_err(|e| PipelineError::InvalidEvent(format!("unrecognized object event: {e}")))
    }

    /// The object the event refers to, with the key URL-decoded.
    ///
    /// For notification batches only the first record is used.
    pub fn object_ref(&self) -> Result<ObjectRef, PipelineError> {
        let detail = match self {
            Self::EventBus { detail } => detail,
            Self::Notification { records } => {
                &records
                    .first()
                    .ok_or_else(|| PipelineError::InvalidEvent("event has no records".into()))?
                    .s3
            }
        };
        Ok(ObjectRef {
            bucket: detail.bucket.name.clone(),
            key: decode_object_key(&detail.object.key)?,
        })
    }
}

/// Keys arrive form-encoded: `+` is a space, then `%XX` escapes.
pub fn decode_object_key(raw: &str) -> Result<String, PipelineError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| PipelineError::InvalidEvent(format!("object key {raw:?} is not UTF-8: {e}")))
}

// ── Intake ──────────────────────────────────────────────────────────

/// Output of the intake recorder; input of the drafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeOutput {
    pub email_id: String,
    pub received_ts: DateTime<Utc>,
    /// Raw message text.
    pub email: String,
    pub outcome: CreateOutcome,
}

// ── Drafter ─────────────────────────────────────────────────────────

/// Input of the drafter. Accepts the intake output as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub email_id: String,
    pub email: String,
}

impl From<IntakeOutput> for DraftRequest {
    fn from(intake: IntakeOutput) -> Self {
        Self {
            email_id: intake.email_id,
            email: intake.email,
        }
    }
}

/// Output of the drafter; input of the review dispatcher. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftOutcome {
    pub email_id: String,
    #[serde(alias = "response_generated")]
    pub generated: bool,
    /// Original message, unchanged.
    #[serde(alias = "email")]
    pub raw_email: String,
    /// Empty when `generated` is false.
    #[serde(alias = "response", default)]
    pub draft_text: String,
}

impl DraftOutcome {
    /// The draft to show the reviewer, if there is one.
    pub fn draft(&self) -> Option<&str> {
        (self.generated && !self.draft_text.is_empty()).then_some(self.draft_text.as_str())
    }
}

// ── Review ──────────────────────────────────────────────────────────

/// Output of the review dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewResult {
    pub email_id: String,
    /// Delivery service status code.
    pub status_code: u16,
    /// The composed review body.
    pub body: String,
    pub disposition: Disposition,
}

// ── Refresher ───────────────────────────────────────────────────────

/// A knowledge base refresh started by this system. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub status: String,
    pub source_key: String,
}

/// Output of the refresher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshResult {
    /// Status code of the start-job call.
    pub status_code: u16,
    /// JSON-encoded status summary string.
    pub body: String,
    pub job: IngestionJob,
}

// ── Chained run ─────────────────────────────────────────────────────

/// Result of running intake, draft and review in one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundResult {
    pub email_id: String,
    pub outcome: CreateOutcome,
    pub generated: bool,
    pub review: ReviewResult,
}
