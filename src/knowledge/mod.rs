//! Knowledge base services: retrieval-augmented generation and ingestion.

pub mod client;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::KnowledgeBaseError;

pub use client::KnowledgeBaseClient;

/// Result of a retrieve-and-generate call.
///
/// A non-success status is a response, not an error; callers decide what
/// it means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResponse {
    pub status_code: u16,
    /// Generated text; empty when the service returned none.
    pub text: String,
}

/// Answer to a start-ingestion-job call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartJobResponse {
    pub status_code: u16,
    pub job_id: String,
    pub status: String,
}

/// Current state of an ingestion job as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub status: String,
}

/// Retrieval-augmented generation scoped to a knowledge base and model.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn retrieve_and_generate(
        &self,
        prompt: &str,
        knowledge_base_id: &str,
        model_id: &str,
    ) -> Result<GenerationResponse, KnowledgeBaseError>;
}

/// Asynchronous re-indexing of a knowledge base's content source.
#[async_trait]
pub trait IngestionService: Send + Sync {
    /// Start a job. `client_token` makes retried submissions idempotent.
    async fn start_ingestion_job(
        &self,
        client_token: &str,
        data_source_id: &str,
        knowledge_base_id: &str,
        description: &str,
    ) -> Result<StartJobResponse, KnowledgeBaseError>;

    async fn get_ingestion_job(
        &self,
        job_id: &str,
        data_source_id: &str,
        knowledge_base_id: &str,
    ) -> Result<JobStatus, KnowledgeBaseError>;
}
