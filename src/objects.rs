//! Object storage holding raw email bytes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::config::ObjectSource;
use crate::error::StorageError;

/// Read-only access to stored objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;
}

/// Build the store selected by configuration.
pub fn from_source(source: &ObjectSource) -> Box<dyn ObjectStore> {
    match source {
        ObjectSource::Filesystem(root) => Box::new(FsObjectStore::new(root.clone())),
        ObjectSource::Http(endpoint) => Box::new(HttpObjectStore::new(endpoint.clone())),
    }
}

// ── Filesystem ──────────────────────────────────────────────────────

/// Objects live at `<root>/<bucket>/<key>`.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        for (label, value) in [("bucket", bucket), ("key", key)] {
            let escapes = Path::new(value)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
            if value.is_empty() || escapes {
                return Err(StorageError::InvalidKey {
                    key: value.to_string(),
                    reason: format!("{label} must be a relative path without '..'"),
                });
            }
        }
        Ok(self.root.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Unreadable {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

// ── HTTP ────────────────────────────────────────────────────────────

/// Objects served at `<endpoint>/<bucket>/<key>`.
pub struct HttpObjectStore {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}/{}", self.endpoint, urlencoding::encode(bucket), key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let url = self.object_url(bucket, key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::Http(format!("GET {url}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StorageError::Unreadable {
                bucket: bucket.to_string(),
                key: key.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::Http(format!("GET {url} body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
