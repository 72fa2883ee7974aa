//! Response drafter: ask the knowledge base for a candidate reply.

use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::mime::parse_email;
use crate::config::KnowledgeBaseConfig;
use crate::error::PipelineError;
use crate::knowledge::KnowledgeBase;
use crate::pipeline::types::{DraftOutcome, DraftRequest};

/// Instruction placed before the email body.
pub const PROMPT_PREFIX: &str = "Provide an email response to the following email: ";

/// Input limit of the generation service, in characters.
pub const MAX_PROMPT_CHARS: usize = 1000;

/// Build the generation prompt, truncated to [`MAX_PROMPT_CHARS`].
///
/// Truncation applies to the whole prompt, prefix included, and never
/// splits a character.
pub fn build_prompt(body: &str) -> String {
    PROMPT_PREFIX
        .chars()
        .chain(body.chars())
        .take(MAX_PROMPT_CHARS)
        .collect()
}

/// Drafts replies through retrieval-augmented generation.
pub struct ResponseDrafter {
    knowledge: Arc<dyn KnowledgeBase>,
    knowledge_base_id: String,
    model_id: String,
}

impl ResponseDrafter {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>, config: &KnowledgeBaseConfig) -> Self {
        Self {
            knowledge,
            knowledge_base_id: config.knowledge_base_id.clone(),
            model_id: config.model_id.clone(),
        }
    }

    /// Draft a reply for one email.
    ///
    /// The generation call is made exactly once. Any failure or non-200
    /// status is recovered as `generated = false` with an empty draft.
    pub async fn handle(&self, request: DraftRequest) -> Result<DraftOutcome, PipelineError> {
        let DraftRequest { email_id, email } = request;

        let parsed = parse_email(&email).ok_or_else(|| PipelineError::Parse {
            email_id: email_id.clone(),
        })?;
        let prompt = build_prompt(&parsed.plain_text());

        let (generated, draft_text) = match self
            .knowledge
            .retrieve_and_generate(&prompt, &self.knowledge_base_id, &self.model_id)
            .await
        {
            Ok(response) if response.status_code == 200 => (true, response.text),
            Ok(response) => {
                warn!(
                    stage = "draft",
                    email_id = %email_id,
                    status_code = response.status_code,
                    "Generation returned non-success status"
                );
                (false, String::new())
            }
            Err(e) => {
                warn!(stage = "draft", email_id = %email_id, error = %e, "Generation failed");
                (false, String::new())
            }
        };

        info!(
            stage = "draft",
            email_id = %email_id,
            generated,
            prompt_chars = prompt.chars().count(),
            "Draft complete"
        );

        Ok(DraftOutcome {
            email_id,
            generated,
            raw_email: email,
            draft_text,
        })
    }
}
