//! Error types for the triage pipeline.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record {id} is {from:?}, cannot transition to {to:?}")]
    InvalidTransition { id: String, from: String, to: String },
}

/// Object storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("Object {bucket}/{key} unreadable: {reason}")]
    Unreadable {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Retrieval/generation and ingestion service errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeBaseError {
    #[error("Knowledge base request {operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("Invalid response from {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },
}

/// Email delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Delivery rejected with status {status_code}")]
    Rejected { status_code: u16 },
}

/// Pipeline stage errors. Each carries enough context for a manual replay.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Fetch of {bucket}/{key} failed: {source}")]
    Fetch {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Object {bucket}/{key} is not valid UTF-8")]
    NotText { bucket: String, key: String },

    #[error("Record write for {email_id} failed: {source}")]
    RecordWrite {
        email_id: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Record read for {email_id} failed: {source}")]
    RecordRead {
        email_id: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Email {email_id} could not be parsed as MIME")]
    Parse { email_id: String },

    #[error("No record exists for {email_id}")]
    RecordNotFound { email_id: String },

    #[error("Email {email_id} is already under review")]
    AlreadyReviewed { email_id: String },

    #[error("Review delivery for {email_id} failed: {source}")]
    Delivery {
        email_id: String,
        #[source]
        source: DeliveryError,
    },

    #[error("Ingestion job for {key} failed: {source}")]
    Ingestion {
        key: String,
        #[source]
        source: KnowledgeBaseError,
    },
}
