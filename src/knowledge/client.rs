//! HTTP client for the knowledge base agent and runtime APIs.
//!
//! Speaks the Bedrock agent REST wire shapes. Request signing is left to
//! the gateway in front of `endpoint`; an optional bearer token is sent
//! when configured.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::KnowledgeBaseConfig;
use crate::error::KnowledgeBaseError;
use crate::knowledge::{
    GenerationResponse, IngestionService, JobStatus, KnowledgeBase, StartJobResponse,
};

/// Knowledge base service client.
pub struct KnowledgeBaseClient {
    endpoint: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl KnowledgeBaseClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &KnowledgeBaseConfig) -> Self {
        Self::new(config.endpoint.clone(), config.api_key.clone())
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn ingestion_jobs_path(data_source_id: &str, knowledge_base_id: &str) -> String {
        format!(
            "knowledgebases/{}/datasources/{}/ingestionjobs/",
            urlencoding::encode(knowledge_base_id),
            urlencoding::encode(data_source_id)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveAndGenerateRequest<'a> {
    input: TextInput<'a>,
    retrieve_and_generate_configuration: GenerationConfiguration<'a>,
}

#[derive(Serialize)]
struct TextInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfiguration<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    knowledge_base_configuration: KnowledgeBaseConfiguration<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KnowledgeBaseConfiguration<'a> {
    knowledge_base_id: &'a str,
    model_arn: &'a str,
}

#[derive(Deserialize)]
struct RetrieveAndGenerateResponse {
    #[serde(default)]
    output: Option<TextOutput>,
}

#[derive(Deserialize)]
struct TextOutput {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartIngestionJobRequest<'a> {
    client_token: &'a str,
    description: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionJobEnvelope {
    ingestion_job: IngestionJobBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionJobBody {
    ingestion_job_id: String,
    #[serde(default)]
    status: String,
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl KnowledgeBase for KnowledgeBaseClient {
    async fn retrieve_and_generate(
        &self,
        prompt: &str,
        knowledge_base_id: &str,
        model_id: &str,
    ) -> Result<GenerationResponse, KnowledgeBaseError> {
        const OPERATION: &str = "retrieveAndGenerate";
        let body = RetrieveAndGenerateRequest {
            input: TextInput { text: prompt },
            retrieve_and_generate_configuration: GenerationConfiguration {
                kind: "KNOWLEDGE_BASE",
                knowledge_base_configuration: KnowledgeBaseConfiguration {
                    knowledge_base_id,
                    model_arn: model_id,
                },
            },
        };

        let resp = self
            .authorize(self.client.post(self.api_url(OPERATION)))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed(OPERATION, e))?;

        let status_code = resp.status().as_u16();
        if !resp.status().is_success() {
            tracing::warn!(status_code, "{OPERATION} returned non-success status");
            return Ok(GenerationResponse {
                status_code,
                text: String::new(),
            });
        }

        let parsed: RetrieveAndGenerateResponse =
            resp.json().await.map_err(|e| invalid_response(OPERATION, e))?;
        Ok(GenerationResponse {
            status_code,
            text: parsed.output.map(|o| o.text).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl IngestionService for KnowledgeBaseClient {
    async fn start_ingestion_job(
        &self,
        client_token: &str,
        data_source_id: &str,
        knowledge_base_id: &str,
        description: &str,
    ) -> Result<StartJobResponse, KnowledgeBaseError> {
        const OPERATION: &str = "StartIngestionJob";
        let url = self.api_url(&Self::ingestion_jobs_path(data_source_id, knowledge_base_id));
        let body = StartIngestionJobRequest {
            client_token,
            description,
        };

        let resp = self
            .authorize(self.client.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed(OPERATION, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(KnowledgeBaseError::RequestFailed {
                operation: OPERATION.into(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let envelope: IngestionJobEnvelope =
            resp.json().await.map_err(|e| invalid_response(OPERATION, e))?;
        Ok(StartJobResponse {
            status_code: status.as_u16(),
            job_id: envelope.ingestion_job.ingestion_job_id,
            status: envelope.ingestion_job.status,
        })
    }

    async fn get_ingestion_job(
        &self,
        job_id: &str,
        data_source_id: &str,
        knowledge_base_id: &str,
    ) -> Result<JobStatus, KnowledgeBaseError> {
        const OPERATION: &str = "GetIngestionJob";
        let url = self.api_url(&format!(
            "{}{}",
            Self::ingestion_jobs_path(data_source_id, knowledge_base_id),
            urlencoding::encode(job_id)
        ));

        let resp = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| request_failed(OPERATION, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(KnowledgeBaseError::RequestFailed {
                operation: OPERATION.into(),
                reason: format!("HTTP {status}"),
            });
        }

        let envelope: IngestionJobEnvelope =
            resp.json().await.map_err(|e| invalid_response(OPERATION, e))?;
        Ok(JobStatus {
            job_id: envelope.ingestion_job.ingestion_job_id,
            status: envelope.ingestion_job.status,
        })
    }
}

fn request_failed(operation: &str, e: reqwest::Error) -> KnowledgeBaseError {
    KnowledgeBaseError::RequestFailed {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}

fn invalid_response(operation: &str, e: reqwest::Error) -> KnowledgeBaseError {
    KnowledgeBaseError::InvalidResponse {
        operation: operation.to_string(),
        reason: e.to_string(),
    }
}
