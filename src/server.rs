//! HTTP event-trigger host.
//!
//! Every stage invocation arrives as one JSON POST. Errors map to status
//! codes the trigger infrastructure can act on: 4xx are final, 5xx are
//! worth retrying.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{DatabaseError, PipelineError, StorageError};
use crate::pipeline::types::{DraftOutcome, DraftRequest, ObjectEvent};
use crate::pipeline::{
    Disposition, IntakeRecorder, KnowledgeBaseRefresher, PipelineRunner, ResponseDrafter,
    ReviewDispatcher,
};
use crate::store::RecordStore;

const DEFAULT_PENDING_LIMIT: usize = 50;
const MAX_PENDING_LIMIT: usize = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<IntakeRecorder>,
    pub drafter: Arc<ResponseDrafter>,
    pub review: Arc<ReviewDispatcher>,
    pub refresher: Arc<KnowledgeBaseRefresher>,
    pub runner: Arc<PipelineRunner>,
    pub records: Arc<dyn RecordStore>,
}

/// Build the Axum router with event and record routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events/intake", post(intake_event))
        .route("/events/draft", post(draft_event))
        .route("/events/review", post(review_event))
        .route("/events/refresh", post(refresh_event))
        .route("/events/inbound", post(inbound_event))
        .route("/records/pending", get(pending_records))
        .route("/records/{email_id}", get(get_record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Errors ──────────────────────────────────────────────────────────

/// Handler error with its HTTP status.
pub enum ApiError {
    Pipeline(PipelineError),
    Database(DatabaseError),
    NotFound(String),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        Self::Database(e)
    }
}

/// Status code for a pipeline failure.
pub fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
        PipelineError::AlreadyReviewed { .. } => StatusCode::CONFLICT,
        PipelineError::RecordNotFound { .. }
        | PipelineError::Fetch {
            source: StorageError::NotFound { .. },
            ..
        } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Pipeline(e) => (status_for(&e), e.to_string()),
            Self::Database(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, what),
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %message, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Decode a JSON payload, treating a shape mismatch as an invalid event.
fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, PipelineError> {
    serde_json::from_value(payload).map_err(|e| PipelineError::InvalidEvent(e.to_string()))
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kb-mail-triage"
    }))
}

// ── Events ──────────────────────────────────────────────────────────

async fn intake_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let source = ObjectEvent::from_value(payload)?.object_ref()?;
    Ok(Json(state.intake.handle(&source).await?))
}

async fn draft_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request: DraftRequest = decode(payload)?;
    Ok(Json(state.drafter.handle(request).await?))
}

async fn review_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome: DraftOutcome = decode(payload)?;
    Ok(Json(state.review.handle(&outcome).await?))
}

async fn refresh_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let source = ObjectEvent::from_value(payload)?.object_ref()?;
    Ok(Json(state.refresher.handle(&source).await?))
}

async fn inbound_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let source = ObjectEvent::from_value(payload)?.object_ref()?;
    Ok(Json(state.runner.run(&source).await?))
}

// ── Records ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PendingQuery {
    limit: Option<usize>,
}

async fn pending_records(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PENDING_LIMIT)
        .min(MAX_PENDING_LIMIT);
    let records = state
        .records
        .list_by_disposition(Disposition::Received, limit)
        .await?;
    Ok(Json(records))
}

async fn get_record(
    State(state): State<AppState>,
    Path(email_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .records
        .get_record(&email_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No record for {email_id}")))?;
    let transitions = state.records.list_transitions(&email_id).await?;
    Ok(Json(serde_json::json!({
        "record": record,
        "transitions": transitions,
    })))
}
