use async_trait::async_trait;

use crate::errors::*;
use crate::ledger::Ledger;
use crate::proposal::Proposal;

/// Transport to a ledger: the embedded one, or a remote node over HTTP.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Order and commit a state-changing transaction; returns its payload.
    async fn submit(&self, proposal: Proposal) -> Result<Vec<u8>>;

    /// Run a read-only query; nothing is committed.
    async fn evaluate(&self, proposal: Proposal) -> Result<Vec<u8>>;

    /// Short description for logs and the health endpoint.
    fn endpoint(&self) -> String;
}

#[async_trait]
impl LedgerClient for Ledger {
    async fn submit(&self, proposal: Proposal) -> Result<Vec<u8>> {
        Ledger::submit(self, &proposal).await
    }

    async fn evaluate(&self, proposal: Proposal) -> Result<Vec<u8>> {
        Ledger::evaluate(self, &proposal).await
    }

    fn endpoint(&self) -> String {
        format!("embedded:{}", self.channel())
    }
}
