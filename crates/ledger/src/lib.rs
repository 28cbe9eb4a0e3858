//! Ledger client stack and the embedded single-node ledger.
//!
//! Applications talk to a ledger through a [`Gateway`]: connect with a wallet
//! identity, pick a channel and chaincode, then `submit` (ordered and
//! committed) or `evaluate` (read-only) named transactions. The transport
//! behind the gateway is a [`LedgerClient`]: either the in-process [`Ledger`]
//! or a [`RemoteLedgerClient`] speaking to another node over HTTP.

pub mod client;
pub mod contract;
pub mod errors;
pub mod gateway;
pub mod ledger;
pub mod proposal;
pub mod remote;

pub use client::LedgerClient;
pub use contract::AssetContract;
pub use errors::{LedgerError, Result};
pub use gateway::{ConnectOptions, Contract, Gateway, GatewayConnection, Network};
pub use ledger::{Ledger, LedgerSettings, GET_BLOCK_BY_NUMBER, GET_CHAIN_INFO, QSCC};
pub use proposal::Proposal;
pub use remote::{LedgerErrorResponse, PayloadResponse, RemoteLedgerClient};
