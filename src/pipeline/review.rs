//! Review dispatcher: send the draft to a human reviewer and advance the
//! record to its terminal disposition.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::channels::email::{Mailer, OutboundEmail};
use crate::channels::mime::{OriginalHeaders, parse_email};
use crate::config::ReviewConfig;
use crate::error::{DatabaseError, DeliveryError, PipelineError};
use crate::pipeline::state::Disposition;
use crate::pipeline::types::{DraftOutcome, ReviewResult};
use crate::store::RecordStore;

const BANNER: &str = "******** Email response review ********";
const NO_DRAFT_NOTICE: &str = "\n\n--------No Generated Response Message--------";
const DRAFT_HEADING: &str = "\n\n--------Generated Response Message--------";
const SIGN_OFF: &str = "\n\nSincerely,\nHR Email Assistant\n\n";
const DISCLAIMER: &str = "Note: This email response was autogenerated, if you need further information please reach out to your local HR contact directly.";
const ORIGINAL_HEADING: &str = "\n\n--------Original Message--------";
const SUBJECT_PREFIX: &str = "Email review - ";

/// Compose the review body: banner, draft or notice, then the original.
pub fn compose_review_body(headers: &OriginalHeaders, body: &str, draft: Option<&str>) -> String {
    let header = |value: &Option<String>| value.clone().unwrap_or_default();

    let mut out = String::from(BANNER);
    match draft {
        None => out.push_str(NO_DRAFT_NOTICE),
        Some(draft) => {
            out.push_str(DRAFT_HEADING);
            out.push('\n');
            out.push_str(draft);
            out.push_str(SIGN_OFF);
            out.push_str(DISCLAIMER);
        }
    }
    out.push_str(ORIGINAL_HEADING);
    out.push_str(&format!("\nFrom: {}", header(&headers.from)));
    out.push_str(&format!("\nSent: {}", header(&headers.date)));
    out.push_str(&format!("\nTo: {}", header(&headers.to)));
    out.push_str(&format!("\nSubject: {}", header(&headers.subject)));
    out.push_str("\n\n");
    out.push_str(body);
    out
}

pub fn review_subject(original: Option<&str>) -> String {
    format!("{SUBJECT_PREFIX}{}", original.unwrap_or_default())
}

/// Routes drafts to the reviewer.
pub struct ReviewDispatcher {
    mailer: Arc<dyn Mailer>,
    records: Arc<dyn RecordStore>,
    config: ReviewConfig,
}

impl ReviewDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, records: Arc<dyn RecordStore>, config: ReviewConfig) -> Self {
        Self {
            mailer,
            records,
            config,
        }
    }

    /// Send the review email, then mark the record under review.
    ///
    /// The disposition only changes after the delivery service accepts the
    /// email. Records that are missing or already under review are left
    /// alone and nothing is sent.
    pub async fn handle(&self, outcome: &DraftOutcome) -> Result<ReviewResult, PipelineError> {
        let email_id = outcome.email_id.as_str();

        let record = self
            .records
            .get_record(email_id)
            .await
            .map_err(|e| PipelineError::RecordRead {
                email_id: email_id.to_string(),
                source: e,
            })?
            .ok_or_else(|| PipelineError::RecordNotFound {
                email_id: email_id.to_string(),
            })?;
        if record.disposition.is_terminal() {
            warn!(stage = "review", email_id, "Email already under review, skipping");
            return Err(PipelineError::AlreadyReviewed {
                email_id: email_id.to_string(),
            });
        }

        let parsed = parse_email(&outcome.raw_email).ok_or_else(|| PipelineError::Parse {
            email_id: email_id.to_string(),
        })?;
        let body = compose_review_body(&parsed.headers, &parsed.plain_text(), outcome.draft());
        let email = OutboundEmail {
            from: self.config.email_source.clone(),
            to: self.config.review_address.clone(),
            subject: review_subject(parsed.headers.subject.as_deref()),
            body,
        };

        let delivery_failed = |source: DeliveryError| {
            error!(stage = "review", email_id, error = %source, "Review delivery failed");
            PipelineError::Delivery {
                email_id: email_id.to_string(),
                source,
            }
        };
        let receipt = self.mailer.send(&email).await.map_err(delivery_failed)?;
        if !receipt.is_success() {
            return Err(delivery_failed(DeliveryError::Rejected {
                status_code: receipt.status_code,
            }));
        }

        let updated = self
            .records
            .update_disposition(email_id, Disposition::UnderReview, Utc::now())
            .await
            .map_err(|e| match e {
                DatabaseError::InvalidTransition { .. } => PipelineError::AlreadyReviewed {
                    email_id: email_id.to_string(),
                },
                DatabaseError::NotFound { .. } => PipelineError::RecordNotFound {
                    email_id: email_id.to_string(),
                },
                other => {
                    error!(stage = "review", email_id, error = %other, "Disposition update failed after delivery");
                    PipelineError::RecordWrite {
                        email_id: email_id.to_string(),
                        source: other,
                    }
                }
            })?;

        info!(
            stage = "review",
            email_id,
            status_code = receipt.status_code,
            generated = outcome.generated,
            "Review email sent"
        );

        Ok(ReviewResult {
            email_id: email_id.to_string(),
            status_code: receipt.status_code,
            body: email.body,
            disposition: updated.disposition,
        })
    }
}
