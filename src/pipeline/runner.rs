//! In-process chaining of intake → draft → review.
//!
//! For deployments without an external step orchestrator. Each stage keeps
//! its own failure semantics; the first error stops the chain.

use std::sync::Arc;

use tracing::info;

use crate::error::PipelineError;
use crate::pipeline::drafter::ResponseDrafter;
use crate::pipeline::intake::IntakeRecorder;
use crate::pipeline::review::ReviewDispatcher;
use crate::pipeline::types::{InboundResult, ObjectRef};

pub struct PipelineRunner {
    intake: Arc<IntakeRecorder>,
    drafter: Arc<ResponseDrafter>,
    review: Arc<ReviewDispatcher>,
}

impl PipelineRunner {
    pub fn new(
        intake: Arc<IntakeRecorder>,
        drafter: Arc<ResponseDrafter>,
        review: Arc<ReviewDispatcher>,
    ) -> Self {
        Self {
            intake,
            drafter,
            review,
        }
    }

    /// Run one inbound email through all three stages.
    pub async fn run(&self, source: &ObjectRef) -> Result<InboundResult, PipelineError> {
        let intake = self.intake.handle(source).await?;
        let outcome = intake.outcome;
        let draft = self.drafter.handle(intake.into()).await?;
        let review = self.review.handle(&draft).await?;

        info!(
            email_id = %review.email_id,
            generated = draft.generated,
            status_code = review.status_code,
            "Inbound email processed"
        );

        Ok(InboundResult {
            email_id: review.email_id.clone(),
            outcome,
            generated: draft.generated,
            review,
        })
    }
}
