//! Gateway: the client-side entry point for signing and sending proposals.
//!
//! A [`GatewayConnection`] binds one wallet identity to a [`LedgerClient`].
//! Connections are cheap, meant to live for one workflow invocation, and are
//! released when dropped.

use filechain_identity::Identity;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client::LedgerClient;
use crate::errors::*;
use crate::proposal::Proposal;

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Wallet label of the identity to transact as.
    pub identity_label: String,
    /// Whether the client may discover peers beyond the configured endpoint.
    pub discovery_enabled: bool,
}

#[derive(Clone)]
pub struct Gateway {
    client: Arc<dyn LedgerClient>,
    active: Arc<AtomicUsize>,
}

impl Gateway {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open a connection that signs as `identity`.
    pub fn connect(&self, identity: Identity, options: ConnectOptions) -> Result<GatewayConnection> {
        identity.validate()?;
        self.active.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            identity = %options.identity_label,
            discovery = options.discovery_enabled,
            endpoint = %self.client.endpoint(),
            "gateway connected"
        );
        Ok(GatewayConnection {
            client: self.client.clone(),
            identity,
            label: options.identity_label,
            active: self.active.clone(),
        })
    }

    /// Number of connections currently open.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> String {
        self.client.endpoint()
    }
}

pub struct GatewayConnection {
    client: Arc<dyn LedgerClient>,
    identity: Identity,
    label: String,
    active: Arc<AtomicUsize>,
}

impl GatewayConnection {
    pub fn network(&self, channel: &str) -> Network<'_> {
        Network {
            connection: self,
            channel: channel.to_string(),
        }
    }

    pub fn identity_label(&self) -> &str {
        &self.label
    }
}

impl Drop for GatewayConnection {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(identity = %self.label, "gateway disconnected");
    }
}

pub struct Network<'a> {
    connection: &'a GatewayConnection,
    channel: String,
}

impl<'a> Network<'a> {
    pub fn contract(&self, chaincode: &str) -> Contract<'a> {
        Contract {
            connection: self.connection,
            channel: self.channel.clone(),
            chaincode: chaincode.to_string(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

pub struct Contract<'a> {
    connection: &'a GatewayConnection,
    channel: String,
    chaincode: String,
}

impl Contract<'_> {
    fn proposal(&self, function: &str, args: &[&str]) -> Result<Proposal> {
        Proposal::signed(
            &self.connection.identity,
            &self.connection.label,
            &self.channel,
            &self.chaincode,
            function,
            args.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Submit a state-changing transaction and wait for its commit.
    pub async fn submit(&self, function: &str, args: &[&str]) -> Result<Vec<u8>> {
        let proposal = self.proposal(function, args)?;
        self.connection.client.submit(proposal).await
    }

    /// Evaluate a query; nothing is committed.
    pub async fn evaluate(&self, function: &str, args: &[&str]) -> Result<Vec<u8>> {
        let proposal = self.proposal(function, args)?;
        self.connection.client.evaluate(proposal).await
    }

    /// [`Contract::evaluate`] and decode the JSON payload.
    pub async fn evaluate_json<T: DeserializeOwned>(&self, function: &str, args: &[&str]) -> Result<T> {
        let payload = self.evaluate(function, args).await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// [`Contract::submit`] and decode the JSON payload.
    pub async fn submit_json<T: DeserializeOwned>(&self, function: &str, args: &[&str]) -> Result<T> {
        let payload = self.submit(function, args).await?;
        Ok(serde_json::from_slice(&payload)?)
    }
}
