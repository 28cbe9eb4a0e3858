use thiserror::Error;

/// Errors raised while endorsing, committing or querying ledger transactions.
///
/// Every variant has a stable string [`code`](LedgerError::code) so the
/// error survives a round trip through the ledger HTTP API.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("the asset {0} does not exist")]
    NotFound(String),

    #[error("the asset {0} already exists")]
    AlreadyExists(String),

    #[error("ledger already initialized")]
    AlreadyInitialized,

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("channel {0} not found")]
    ChannelNotFound(String),

    #[error("chaincode {0} not found")]
    ChaincodeNotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transaction {0} was already committed")]
    DuplicateTransaction(String),

    #[error("ledger unreachable: {0}")]
    Connection(String),

    #[error("internal ledger error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::AlreadyExists(_) => "already_exists",
            LedgerError::AlreadyInitialized => "already_initialized",
            LedgerError::UnknownTransaction(_) => "unknown_transaction",
            LedgerError::InvalidArguments(_) => "invalid_arguments",
            LedgerError::BlockNotFound(_) => "block_not_found",
            LedgerError::ChannelNotFound(_) => "channel_not_found",
            LedgerError::ChaincodeNotFound(_) => "chaincode_not_found",
            LedgerError::Unauthorized(_) => "unauthorized",
            LedgerError::DuplicateTransaction(_) => "duplicate_transaction",
            LedgerError::Connection(_) => "connection",
            LedgerError::Internal(_) => "internal",
        }
    }

    /// The variant's argument, as carried in the HTTP error `detail` field.
    pub fn detail(&self) -> String {
        match self {
            LedgerError::NotFound(s)
            | LedgerError::AlreadyExists(s)
            | LedgerError::UnknownTransaction(s)
            | LedgerError::InvalidArguments(s)
            | LedgerError::ChannelNotFound(s)
            | LedgerError::ChaincodeNotFound(s)
            | LedgerError::Unauthorized(s)
            | LedgerError::DuplicateTransaction(s)
            | LedgerError::Connection(s)
            | LedgerError::Internal(s) => s.clone(),
            LedgerError::BlockNotFound(n) => n.to_string(),
            LedgerError::AlreadyInitialized => String::new(),
        }
    }

    /// Rebuild an error from its wire code and detail.
    pub fn from_code(code: &str, detail: String) -> Self {
        match code {
            "not_found" => LedgerError::NotFound(detail),
            "already_exists" => LedgerError::AlreadyExists(detail),
            "already_initialized" => LedgerError::AlreadyInitialized,
            "unknown_transaction" => LedgerError::UnknownTransaction(detail),
            "invalid_arguments" => LedgerError::InvalidArguments(detail),
            "block_not_found" => match detail.parse() {
                Ok(n) => LedgerError::BlockNotFound(n),
                Err(_) => LedgerError::Internal(format!("block_not_found: {detail}")),
            },
            "channel_not_found" => LedgerError::ChannelNotFound(detail),
            "chaincode_not_found" => LedgerError::ChaincodeNotFound(detail),
            "unauthorized" => LedgerError::Unauthorized(detail),
            "duplicate_transaction" => LedgerError::DuplicateTransaction(detail),
            "connection" => LedgerError::Connection(detail),
            _ => LedgerError::Internal(detail),
        }
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(err: anyhow::Error) -> Self {
        LedgerError::Internal(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Internal(format!("serialization: {err}"))
    }
}

impl From<filechain_identity::IdentityError> for LedgerError {
    fn from(err: filechain_identity::IdentityError) -> Self {
        LedgerError::Unauthorized(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        let errors = vec![
            LedgerError::NotFound("abc".into()),
            LedgerError::AlreadyExists("abc".into()),
            LedgerError::AlreadyInitialized,
            LedgerError::BlockNotFound(7),
            LedgerError::Unauthorized("bad signature".into()),
            LedgerError::DuplicateTransaction("tx-1".into()),
        ];
        for err in errors {
            let rebuilt = LedgerError::from_code(err.code(), err.detail());
            assert_eq!(rebuilt.to_string(), err.to_string());
        }
    }

    #[test]
    fn test_unknown_code_is_internal() {
        assert!(matches!(
            LedgerError::from_code("teapot", "x".into()),
            LedgerError::Internal(_)
        ));
    }
}
