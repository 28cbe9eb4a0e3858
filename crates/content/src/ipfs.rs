//! Content store backed by an IPFS node's HTTP API.
//!
//! Uses `/api/v0/add` for writes (with `only-hash=true` for dry runs) and
//! `/api/v0/cat` for reads. Locators point at the node's HTTP gateway.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

use crate::store::{ContentDigest, ContentError, ContentStore, Result, StoredContent};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

pub struct IpfsContentStore {
    client: reqwest::Client,
    api_url: String,
    gateway_url: String,
}

impl IpfsContentStore {
    /// `api_url` is the node's RPC endpoint (e.g. `http://127.0.0.1:5001`),
    /// `gateway_url` the public gateway (e.g. `http://127.0.0.1:8080`).
    pub fn new(api_url: impl Into<String>, gateway_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ContentError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn add(&self, bytes: &[u8], only_hash: bool) -> Result<String> {
        let form = Form::new().part("file", Part::bytes(bytes.to_vec()).file_name("upload"));
        let response = self
            .client
            .post(format!("{}/api/v0/add", self.api_url))
            .query(&[
                ("only-hash", only_hash.to_string()),
                ("pin", (!only_hash).to_string()),
            ])
            .multipart(form)
            .send()
            .await
            .map_err(|e| ContentError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::Protocol(format!("add returned {status}: {body}")));
        }

        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| ContentError::Protocol(e.to_string()))?;
        if added.hash.is_empty() {
            return Err(ContentError::Protocol("add returned an empty hash".into()));
        }
        Ok(added.hash)
    }
}

#[async_trait]
impl ContentStore for IpfsContentStore {
    async fn store(&self, bytes: &[u8]) -> Result<StoredContent> {
        let id = self.add(bytes, false).await?;
        tracing::debug!(content_id = %id, size = bytes.len(), "added content to IPFS");
        Ok(StoredContent {
            path: format!("{}/ipfs/{}", self.gateway_url, id),
            size: bytes.len() as u64,
            id,
        })
    }

    async fn hash_only(&self, bytes: &[u8]) -> Result<ContentDigest> {
        let id = self.add(bytes, true).await?;
        Ok(ContentDigest {
            id,
            size: bytes.len() as u64,
        })
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ContentError::InvalidId(id.to_string()));
        }
        let response = self
            .client
            .post(format!("{}/api/v0/cat", self.api_url))
            .query(&[("arg", id)])
            .send()
            .await
            .map_err(|e| ContentError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("not found") {
                return Err(ContentError::NotFound(id.to_string()));
            }
            return Err(ContentError::Protocol(format!("cat returned {status}: {body}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ContentError::Connection(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn backend(&self) -> &'static str {
        "ipfs"
    }
}
