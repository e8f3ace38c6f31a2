//! Object storage access.
//!
//! Uploaded audio stays in object storage; the pipeline only ever reads it.
//! Workers re-fetch objects on demand rather than caching bytes locally, so
//! a crashed worker loses nothing.

use crate::error::{Result, ScribedError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Read-only view of the upload bucket(s).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full object body. Missing objects are an error.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// Object store over an S3-compatible HTTP gateway serving
/// `GET {base_url}/{bucket}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStore {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}/{}", self.base_url, bucket, key);
        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| ScribedError::ObjectFetch {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: e.to_string(),
                })?;

        if !response.status().is_success() {
            return Err(ScribedError::ObjectFetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ScribedError::ObjectFetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: e.to_string(),
            })?;
        Ok(bytes.to_vec())
    }
}

/// In-memory object store for tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .await
            .insert((bucket.to_string(), key.to_string()), body);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ScribedError::ObjectFetch {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "object not found".to_string(),
            })
    }
}
