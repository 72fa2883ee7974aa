//! Knowledge base refresher: start an ingestion job when source documents
//! change and report its initial status.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::config::KnowledgeBaseConfig;
use crate::error::{KnowledgeBaseError, PipelineError};
use crate::knowledge::IngestionService;
use crate::pipeline::types::{IngestionJob, ObjectRef, RefreshResult};

/// Fire-and-observe-once ingestion trigger. Never waits for completion.
pub struct KnowledgeBaseRefresher {
    ingestion: Arc<dyn IngestionService>,
    knowledge_base_id: String,
    data_source_id: String,
}

impl KnowledgeBaseRefresher {
    pub fn new(ingestion: Arc<dyn IngestionService>, config: &KnowledgeBaseConfig) -> Self {
        Self {
            ingestion,
            knowledge_base_id: config.knowledge_base_id.clone(),
            data_source_id: config.data_source_id.clone(),
        }
    }

    pub async fn handle(&self, source: &ObjectRef) -> Result<RefreshResult, PipelineError> {
        let key = source.key.as_str();
        let description = format!("object added/deleted in data source: {key}");
        info!(stage = "refresh", bucket = %source.bucket, key, "{description}");

        let ingestion_failed = |e: KnowledgeBaseError| PipelineError::Ingestion {
            key: key.to_string(),
            source: e,
        };

        // Fresh token per invocation; the service dedupes retried submissions.
        let client_token = Uuid::new_v4().to_string();
        let started = self
            .ingestion
            .start_ingestion_job(
                &client_token,
                &self.data_source_id,
                &self.knowledge_base_id,
                &description,
            )
            .await
            .map_err(ingestion_failed)?;

        let job = self
            .ingestion
            .get_ingestion_job(&started.job_id, &self.data_source_id, &self.knowledge_base_id)
            .await
            .map_err(ingestion_failed)?;

        let summary = format!(
            "ingestion job: object= {key} jobid= {} state= {}",
            started.job_id, job.status
        );
        info!(stage = "refresh", key, job_id = %started.job_id, status = %job.status, "{summary}");

        Ok(RefreshResult {
            status_code: started.status_code,
            body: serde_json::Value::String(summary).to_string(),
            job: IngestionJob {
                job_id: started.job_id,
                status: job.status,
                source_key: key.to_string(),
            },
        })
    }
}
