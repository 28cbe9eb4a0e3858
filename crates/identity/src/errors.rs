use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity not found in wallet: {0}")]
    NotFound(String),

    #[error("Invalid identity label: {0}")]
    InvalidLabel(String),

    #[error("Identity already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Enrollment failed: {0}")]
    Authentication(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Unknown MSP: {0}")]
    UnknownMsp(String),

    #[error("Unknown certificate authority: {0}")]
    UnknownCa(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
