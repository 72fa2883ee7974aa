//! HTTP adapters exercised against stub services served by Axum.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use kb_mail_triage::error::{KnowledgeBaseError, StorageError};
use kb_mail_triage::knowledge::{IngestionService, KnowledgeBase, KnowledgeBaseClient};
use kb_mail_triage::objects::{HttpObjectStore, ObjectStore};

/// Requests seen by the stub service.
#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{port}")
}

fn record(seen: &Seen, headers: &HeaderMap, body: Value) {
    seen.bodies.lock().unwrap().push(body);
    seen.auth.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
}

async fn generate(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    record(&seen, &headers, body);
    Json(json!({
        "sessionId": "s-1",
        "output": {"text": "Employees accrue 20 PTO days per year."},
        "citations": []
    }))
}

async fn start_job(
    State(seen): State<Seen>,
    Path((kb, ds)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    record(&seen, &headers, body);
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "ingestionJob": {
                "ingestionJobId": "JOB1",
                "knowledgeBaseId": kb,
                "dataSourceId": ds,
                "status": "STARTING"
            }
        })),
    )
}

async fn get_job(Path((_kb, _ds, job)): Path<(String, String, String)>) -> impl IntoResponse {
    Json(json!({"ingestionJob": {"ingestionJobId": job, "status": "IN_PROGRESS"}}))
}

fn knowledge_service(seen: Seen) -> Router {
    Router::new()
        .route("/retrieveAndGenerate", post(generate))
        .route(
            "/knowledgebases/{kb}/datasources/{ds}/ingestionjobs/",
            put(start_job),
        )
        .route(
            "/knowledgebases/{kb}/datasources/{ds}/ingestionjobs/{job}",
            get(get_job),
        )
        .with_state(seen)
}

#[tokio::test]
async fn retrieve_and_generate_round_trip() {
    let seen = Seen::default();
    let base = serve(knowledge_service(seen.clone())).await;
    let client = KnowledgeBaseClient::new(base, Some(SecretString::from("kb-token")));

    let response = client
        .retrieve_and_generate("Provide an email response to the following email: hi", "KB123", "arn:model")
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert_eq!(response.text, "Employees accrue 20 PTO days per year.");

    let body = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["input"]["text"], "Provide an email response to the following email: hi");
    assert_eq!(body["retrieveAndGenerateConfiguration"]["type"], "KNOWLEDGE_BASE");
    assert_eq!(
        body["retrieveAndGenerateConfiguration"]["knowledgeBaseConfiguration"]["knowledgeBaseId"],
        "KB123"
    );
    assert_eq!(
        seen.auth.lock().unwrap()[0].as_deref(),
        Some("Bearer kb-token")
    );
}

#[tokio::test]
async fn generation_error_status_is_returned_not_raised() {
    let app = Router::new().route(
        "/retrieveAndGenerate",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "throttled") }),
    );
    let client = KnowledgeBaseClient::new(serve(app).await, None);

    let response = client.retrieve_and_generate("p", "KB123", "arn:model").await.unwrap();
    assert_eq!(response.status_code, 429);
    assert!(response.text.is_empty());
}

#[tokio::test]
async fn unreachable_service_is_an_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let client = KnowledgeBaseClient::new(format!("http://127.0.0.1:{port}"), None);
    let err = client.retrieve_and_generate("p", "KB123", "arn:model").await.unwrap_err();
    assert!(matches!(err, KnowledgeBaseError::RequestFailed { .. }));
}

#[tokio::test]
async fn ingestion_job_start_and_poll() {
    let seen = Seen::default();
    let base = serve(knowledge_service(seen.clone())).await;
    let client = KnowledgeBaseClient::new(base, None);

    let started = client
        .start_ingestion_job("token-1", "DS456", "KB123", "object added/deleted in data source: a.pdf")
        .await
        .unwrap();
    assert_eq!(started.status_code, 202);
    assert_eq!(started.job_id, "JOB1");

    let body = seen.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["clientToken"], "token-1");
    assert_eq!(body["description"], "object added/deleted in data source: a.pdf");
    assert_eq!(seen.auth.lock().unwrap()[0], None);

    let job = client.get_ingestion_job("JOB1", "DS456", "KB123").await.unwrap();
    assert_eq!(job.job_id, "JOB1");
    assert_eq!(job.status, "IN_PROGRESS");
}

#[tokio::test]
async fn http_object_store_fetch() {
    let app = Router::new().route(
        "/{bucket}/{*key}",
        get(|Path((bucket, key)): Path<(String, String)>| async move {
            if bucket == "inbox" && key == "incoming/msg-42" {
                (StatusCode::OK, "Subject: hi\r\n\r\nbody").into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }),
    );
    let store = HttpObjectStore::new(serve(app).await);

    let bytes = store.fetch("inbox", "incoming/msg-42").await.unwrap();
    assert_eq!(bytes, b"Subject: hi\r\n\r\nbody");

    let err = store.fetch("inbox", "incoming/missing").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}
