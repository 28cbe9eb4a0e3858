//! Shared data model for the filechain workspace.
//!
//! Assets and their history entries are what the asset contract stores on the
//! ledger; blocks and transaction envelopes are what the ledger commits.

pub mod asset;
pub mod block;
pub mod time_service;

pub use asset::*;
pub use block::*;
pub use time_service::*;
