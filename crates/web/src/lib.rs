//! Browser-facing asset registry: upload, search, edit and inspect assets
//! recorded on the ledger, plus the ledger HTTP API for remote gateways.

pub mod errors;
pub mod intake;
pub mod ledger_api;
pub mod pages;
pub mod server;
pub mod views;
pub mod workflows;

pub use errors::{Result, WorkflowError};
pub use server::{build_router, start_server, AppState, SharedState, UploadCounters};
pub use workflows::{
    AssetListing, AssetService, RegistrationForm, RegistrationStatus, SearchResult,
    ServiceSettings, UploadOutcome, UploadReport, UploadStatus, UploadedFile,
};
