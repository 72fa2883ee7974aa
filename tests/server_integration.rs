//! Integration tests for the HTTP event host.
//!
//! Each test spins up an Axum server on a random port and drives the real
//! REST contract with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use kb_mail_triage::channels::{Mailer, OutboundEmail, SendReceipt};
use kb_mail_triage::config::{KnowledgeBaseConfig, ReviewConfig};
use kb_mail_triage::error::{DeliveryError, KnowledgeBaseError};
use kb_mail_triage::knowledge::{
    GenerationResponse, IngestionService, JobStatus, KnowledgeBase, StartJobResponse,
};
use kb_mail_triage::objects::FsObjectStore;
use kb_mail_triage::pipeline::{
    IntakeRecorder, KnowledgeBaseRefresher, PipelineRunner, ResponseDrafter, ReviewDispatcher,
};
use kb_mail_triage::server::{AppState, routes};
use kb_mail_triage::store::{LibSqlBackend, RecordStore};

/// Maximum time any request is allowed to take before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const RAW: &str = "From: alice@example.com\r\n\
To: hr@example.com\r\n\
Date: Mon, 3 Jun 2024 09:15:00 +0000\r\n\
Subject: PTO question\r\n\
\r\n\
Need PTO policy";

/// Knowledge base stub for both generation and ingestion.
struct StubKnowledge;

#[async_trait]
impl KnowledgeBase for StubKnowledge {
    async fn retrieve_and_generate(
        &self,
        _prompt: &str,
        _knowledge_base_id: &str,
        _model_id: &str,
    ) -> Result<GenerationResponse, KnowledgeBaseError> {
        Ok(GenerationResponse {
            status_code: 200,
            text: "stub reply".into(),
        })
    }
}

#[async_trait]
impl IngestionService for StubKnowledge {
    async fn start_ingestion_job(
        &self,
        _client_token: &str,
        _data_source_id: &str,
        _knowledge_base_id: &str,
        _description: &str,
    ) -> Result<StartJobResponse, KnowledgeBaseError> {
        Ok(StartJobResponse {
            status_code: 202,
            job_id: "JOB1".into(),
            status: "STARTING".into(),
        })
    }

    async fn get_ingestion_job(
        &self,
        job_id: &str,
        _data_source_id: &str,
        _knowledge_base_id: &str,
    ) -> Result<JobStatus, KnowledgeBaseError> {
        Ok(JobStatus {
            job_id: job_id.into(),
            status: "IN_PROGRESS".into(),
        })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, DeliveryError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(SendReceipt { status_code: 250 })
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    mailer: Arc<RecordingMailer>,
    records: Arc<LibSqlBackend>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        tokio::time::timeout(
            TEST_TIMEOUT,
            self.client.post(format!("{}{path}", self.base)).json(&body).send(),
        )
        .await
        .expect("request timed out")
        .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        tokio::time::timeout(TEST_TIMEOUT, self.client.get(format!("{}{path}", self.base)).send())
            .await
            .expect("request timed out")
            .unwrap()
    }
}

/// Start the host on a random port with one stored email, `inbox/incoming/msg-42`.
async fn start_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let incoming = dir.path().join("inbox").join("incoming");
    std::fs::create_dir_all(&incoming).unwrap();
    std::fs::write(incoming.join("msg-42"), RAW).unwrap();

    let records = Arc::new(LibSqlBackend::new_memory("email_records").await.unwrap());
    let mailer = Arc::new(RecordingMailer::default());
    let knowledge = Arc::new(StubKnowledge);
    let kb_config = KnowledgeBaseConfig {
        endpoint: "http://kb.test".into(),
        api_key: None,
        knowledge_base_id: "KB123".into(),
        model_id: "arn:model".into(),
        data_source_id: "DS456".into(),
    };

    let intake = Arc::new(IntakeRecorder::new(
        Arc::new(FsObjectStore::new(dir.path())),
        records.clone(),
    ));
    let drafter = Arc::new(ResponseDrafter::new(knowledge.clone(), &kb_config));
    let review = Arc::new(ReviewDispatcher::new(
        mailer.clone(),
        records.clone(),
        ReviewConfig {
            email_source: "assistant@example.com".into(),
            review_address: "hr-review@example.com".into(),
        },
    ));
    let app = routes(AppState {
        runner: Arc::new(PipelineRunner::new(intake.clone(), drafter.clone(), review.clone())),
        refresher: Arc::new(KnowledgeBaseRefresher::new(knowledge, &kb_config)),
        intake,
        drafter,
        review,
        records: records.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client: reqwest::Client::new(),
        mailer,
        records,
        _dir: dir,
    }
}

fn msg_42_event() -> Value {
    json!({"detail": {"bucket": {"name": "inbox"}, "object": {"key": "incoming/msg-42"}}})
}

#[tokio::test]
async fn stages_chain_over_http() {
    let server = start_server().await;

    let resp = server.post("/events/intake", msg_42_event()).await;
    assert_eq!(resp.status(), 200);
    let intake: Value = resp.json().await.unwrap();
    assert_eq!(intake["email_id"], "msg-42");
    assert_eq!(intake["outcome"], "created");

    let resp = server.post("/events/draft", intake).await;
    assert_eq!(resp.status(), 200);
    let draft: Value = resp.json().await.unwrap();
    assert_eq!(draft["generated"], true);
    assert_eq!(draft["draft_text"], "stub reply");

    let resp = server.post("/events/review", draft.clone()).await;
    assert_eq!(resp.status(), 200);
    let review: Value = resp.json().await.unwrap();
    assert_eq!(review["status_code"], 250);
    assert_eq!(review["disposition"], "Email Review");

    // Redelivered review event is rejected and sends nothing.
    let resp = server.post("/events/review", draft).await;
    assert_eq!(resp.status(), 409);
    assert_eq!(server.mailer.sent.lock().unwrap().len(), 1);

    let resp = server.get("/records/msg-42").await;
    assert_eq!(resp.status(), 200);
    let detail: Value = resp.json().await.unwrap();
    assert_eq!(detail["record"]["disposition"], "Email Review");
    assert_eq!(detail["transitions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn inbound_runs_whole_chain() {
    let server = start_server().await;

    let resp = server
        .post(
            "/events/inbound",
            json!({"Records": [{"s3": {"bucket": {"name": "inbox"}, "object": {"key": "incoming/msg-42"}}}]}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["email_id"], "msg-42");
    assert_eq!(body["generated"], true);

    let sent = server.mailer.sent.lock().unwrap().clone();
    assert_eq!(sent[0].subject, "Email review - PTO question");
}

#[tokio::test]
async fn pending_lists_received_records() {
    let server = start_server().await;

    server.post("/events/intake", msg_42_event()).await;
    let pending: Value = server.get("/records/pending?limit=10").await.json().await.unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["email_id"], "msg-42");
    assert_eq!(pending[0]["disposition"], "");

    server.post("/events/inbound", msg_42_event()).await;
    let pending: Value = server.get("/records/pending").await.json().await.unwrap();
    assert!(pending.as_array().unwrap().is_empty());
    assert!(server.records.get_record("msg-42").await.unwrap().is_some());
}

#[tokio::test]
async fn refresh_reports_job_state() {
    let server = start_server().await;

    let resp = server
        .post(
            "/events/refresh",
            json!({"detail": {"bucket": {"name": "kb-docs"}, "object": {"key": "policies/PTO+policy.pdf"}}}),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status_code"], 202);
    assert_eq!(
        body["body"],
        "\"ingestion job: object= policies/PTO policy.pdf jobid= JOB1 state= IN_PROGRESS\""
    );
}

#[tokio::test]
async fn error_statuses() {
    let server = start_server().await;

    let resp = server.post("/events/intake", json!({"unexpected": 1})).await;
    assert_eq!(resp.status(), 400);

    let resp = server
        .post(
            "/events/intake",
            json!({"detail": {"bucket": {"name": "inbox"}, "object": {"key": "incoming/missing"}}}),
        )
        .await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("incoming/missing"));

    let resp = server.post("/events/draft", json!({"email_id": "x"})).await;
    assert_eq!(resp.status(), 400);

    let resp = server.get("/records/unknown").await;
    assert_eq!(resp.status(), 404);
}
