use axum::http::StatusCode;
use filechain_content::ContentError;
use filechain_identity::IdentityError;
use filechain_ledger::LedgerError;
use thiserror::Error;

/// Failures surfaced by the asset workflows.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ledger already initialized")]
    AlreadyInitialized,

    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    #[error("validation failure: {0}")]
    ValidationFailure(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn status(&self) -> StatusCode {
        match self {
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::AlreadyInitialized => StatusCode::CONFLICT,
            WorkflowError::ConnectionFailure(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::ValidationFailure(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Forbidden(_) => StatusCode::FORBIDDEN,
            WorkflowError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for WorkflowError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => WorkflowError::NotFound(format!("asset {id}")),
            LedgerError::BlockNotFound(n) => WorkflowError::NotFound(format!("block {n}")),
            LedgerError::AlreadyInitialized => WorkflowError::AlreadyInitialized,
            LedgerError::Connection(msg) => WorkflowError::ConnectionFailure(msg),
            LedgerError::InvalidArguments(msg) => WorkflowError::ValidationFailure(msg),
            LedgerError::AlreadyExists(id) => {
                WorkflowError::ValidationFailure(format!("asset {id} already exists"))
            }
            LedgerError::Unauthorized(msg) => WorkflowError::Forbidden(msg),
            LedgerError::DuplicateTransaction(tx_id) => {
                WorkflowError::Forbidden(format!("transaction {tx_id} was already committed"))
            }
            other => WorkflowError::Internal(other.to_string()),
        }
    }
}

impl From<ContentError> for WorkflowError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound(id) => WorkflowError::NotFound(format!("content {id}")),
            ContentError::InvalidId(id) => {
                WorkflowError::ValidationFailure(format!("invalid content id {id}"))
            }
            ContentError::Connection(msg) => WorkflowError::ConnectionFailure(msg),
            other => WorkflowError::Internal(other.to_string()),
        }
    }
}

impl From<IdentityError> for WorkflowError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotFound(label) => WorkflowError::NotFound(format!("identity {label}")),
            IdentityError::InvalidLabel(_)
            | IdentityError::AlreadyRegistered(_)
            | IdentityError::UnknownMsp(_)
            | IdentityError::UnknownCa(_) => WorkflowError::ValidationFailure(err.to_string()),
            IdentityError::Authentication(_)
            | IdentityError::Unauthorized(_)
            | IdentityError::InvalidCredentials(_)
            | IdentityError::InvalidSignature => WorkflowError::Forbidden(err.to_string()),
            other => WorkflowError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
