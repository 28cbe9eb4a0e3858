//! HTTP client for a node that exposes its embedded ledger.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::client::LedgerClient;
use crate::errors::*;
use crate::proposal::Proposal;

/// Body of a successful `/api/ledger/*` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadResponse {
    /// Base64 encoded transaction payload.
    pub payload: String,
}

/// Body of a failed `/api/ledger/*` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default)]
    pub detail: String,
}

impl From<&LedgerError> for LedgerErrorResponse {
    fn from(err: &LedgerError) -> Self {
        Self {
            error: err.to_string(),
            code: err.code().to_string(),
            detail: err.detail(),
        }
    }
}

#[derive(Clone)]
pub struct RemoteLedgerClient {
    base_url: Url,
    http: Client,
}

impl RemoteLedgerClient {
    /// `base_url` is the remote node's root, e.g. `http://ledger-node:3000/`.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let mut url = Url::parse(base_url.as_ref())
            .map_err(|e| LedgerError::Connection(format!("invalid ledger URL {}: {e}", base_url.as_ref())))?;
        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Connection(e.to_string()))?;
        Ok(Self { base_url: url, http })
    }

    async fn post(&self, path: &str, proposal: &Proposal) -> Result<Vec<u8>> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| LedgerError::Connection(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .json(proposal)
            .send()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;
        Self::map_response(response).await
    }

    async fn map_response(response: Response) -> Result<Vec<u8>> {
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<LedgerErrorResponse>(&bytes) {
                Ok(api_error) => LedgerError::from_code(&api_error.code, api_error.detail),
                Err(_) => LedgerError::Connection(format!(
                    "ledger returned {status}: {}",
                    String::from_utf8_lossy(&bytes)
                )),
            });
        }

        let body: PayloadResponse = serde_json::from_slice(&bytes)?;
        general_purpose::STANDARD
            .decode(body.payload)
            .map_err(|e| LedgerError::Internal(format!("invalid payload encoding: {e}")))
    }
}

#[async_trait]
impl LedgerClient for RemoteLedgerClient {
    async fn submit(&self, proposal: Proposal) -> Result<Vec<u8>> {
        self.post("api/ledger/submit", &proposal).await
    }

    async fn evaluate(&self, proposal: Proposal) -> Result<Vec<u8>> {
        self.post("api/ledger/evaluate", &proposal).await
    }

    fn endpoint(&self) -> String {
        self.base_url.to_string()
    }
}
