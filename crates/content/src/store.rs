//! The content store trait and its in-memory backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::hash::ContentHash;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Invalid content id: {0}")]
    InvalidId(String),

    #[error("Content store unreachable: {0}")]
    Connection(String),

    #[error("Unexpected content store response: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ContentError>;

/// Outcome of a durable write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContent {
    pub id: String,
    /// Byte length of the stored payload.
    pub size: u64,
    /// Locator the browser follows to retrieve the bytes.
    pub path: String,
}

/// Outcome of a hash-only dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigest {
    pub id: String,
    pub size: u64,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist `bytes`. Storing the same bytes twice yields the same id.
    async fn store(&self, bytes: &[u8]) -> Result<StoredContent>;

    /// Identifier `store` would assign, without persisting anything.
    async fn hash_only(&self, bytes: &[u8]) -> Result<ContentDigest>;

    async fn fetch(&self, id: &str) -> Result<Vec<u8>>;

    /// Short backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;
}

pub(crate) fn locator(public_base: &str, id: &str) -> String {
    format!("{}/{}", public_base.trim_end_matches('/'), id)
}

/// In-memory content store (for testing and dev mode).
#[derive(Clone)]
pub struct MemoryContentStore {
    public_base: String,
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into(),
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new("/content")
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn store(&self, bytes: &[u8]) -> Result<StoredContent> {
        let id = ContentHash::from_data(bytes).to_hex();
        self.blobs
            .write()
            .entry(id.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(StoredContent {
            path: locator(&self.public_base, &id),
            size: bytes.len() as u64,
            id,
        })
    }

    async fn hash_only(&self, bytes: &[u8]) -> Result<ContentDigest> {
        Ok(ContentDigest {
            id: ContentHash::from_data(bytes).to_hex(),
            size: bytes.len() as u64,
        })
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(id.to_string()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
