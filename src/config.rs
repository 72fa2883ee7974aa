//! Configuration types.
//!
//! Everything is resolved once at process start. Components receive the
//! pieces they need by reference and never read the environment themselves.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "./data/kb-mail-triage.db";

/// Review mail routing.
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Sender address of every review email.
    pub email_source: String,
    /// Reviewer address that receives every review email.
    pub review_address: String,
}

/// Knowledge base scoping and endpoint.
#[derive(Debug, Clone)]
pub struct KnowledgeBaseConfig {
    pub endpoint: String,
    pub api_key: Option<SecretString>,
    pub knowledge_base_id: String,
    pub model_id: String,
    pub data_source_id: String,
}

/// SMTP relay used by the review dispatcher.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Where raw email objects are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSource {
    /// Local directory; each bucket is a subdirectory.
    Filesystem(PathBuf),
    /// HTTP object gateway serving `<endpoint>/<bucket>/<key>`.
    Http(String),
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub review: ReviewConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub smtp: SmtpConfig,
    pub objects: ObjectSource,
    /// Durable record table name.
    pub record_table: String,
    pub db_path: PathBuf,
    pub http_port: u16,
    /// Directory for rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let record_table = required("TRIAGE_RECORD_TABLE")?;
        if !is_sql_identifier(&record_table) {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_RECORD_TABLE".into(),
                message: format!("{record_table:?} is not a valid table name"),
            });
        }

        let objects = match (optional("TRIAGE_OBJECT_ROOT"), optional("TRIAGE_OBJECT_ENDPOINT")) {
            (Some(root), None) => ObjectSource::Filesystem(PathBuf::from(root)),
            (None, Some(endpoint)) => ObjectSource::Http(endpoint.trim_end_matches('/').to_string()),
            (Some(_), Some(_)) => {
                return Err(ConfigError::InvalidValue {
                    key: "TRIAGE_OBJECT_ROOT".into(),
                    message: "set either TRIAGE_OBJECT_ROOT or TRIAGE_OBJECT_ENDPOINT, not both"
                        .into(),
                });
            }
            (None, None) => {
                return Err(ConfigError::MissingRequired {
                    key: "TRIAGE_OBJECT_ROOT".into(),
                    hint: "Set TRIAGE_OBJECT_ROOT or TRIAGE_OBJECT_ENDPOINT".into(),
                });
            }
        };

        Ok(Self {
            review: ReviewConfig {
                email_source: required("TRIAGE_EMAIL_SOURCE")?,
                review_address: required("TRIAGE_REVIEW_ADDRESS")?,
            },
            knowledge_base: KnowledgeBaseConfig {
                endpoint: required("TRIAGE_KB_ENDPOINT")?.trim_end_matches('/').to_string(),
                api_key: optional("TRIAGE_KB_API_KEY").map(SecretString::from),
                knowledge_base_id: required("TRIAGE_KNOWLEDGE_BASE_ID")?,
                model_id: required("TRIAGE_MODEL_ID")?,
                data_source_id: required("TRIAGE_DATA_SOURCE_ID")?,
            },
            smtp: SmtpConfig {
                host: required("TRIAGE_SMTP_HOST")?,
                port: parse_port(optional("TRIAGE_SMTP_PORT"), "TRIAGE_SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username: required("TRIAGE_SMTP_USERNAME")?,
                password: SecretString::from(required("TRIAGE_SMTP_PASSWORD")?),
            },
            objects,
            record_table,
            db_path: optional("TRIAGE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            http_port: parse_port(optional("TRIAGE_PORT"), "TRIAGE_PORT", DEFAULT_HTTP_PORT)?,
            log_dir: optional("TRIAGE_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_port(value: Option<String>, key: &str, default: u16) -> Result<u16, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{v:?}: {e}"),
        }),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
