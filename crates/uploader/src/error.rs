//! Upload error types.

use fileservice_client::{ApiFailure, ClientError};
use fileservice_transfer::TransferError;

/// Errors produced by an upload or download.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("file is {size} bytes, larger than the allowed {max_bytes} bytes")]
    FileTooLarge { size: u64, max_bytes: u64 },

    #[error("access token is blank")]
    InvalidCredential,

    #[error("service rejected request: {0}")]
    Protocol(ApiFailure),

    #[error("commit still pending after {attempts} status checks")]
    CommitTimeout { attempts: u32 },

    #[error("cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("transfer error: {0}")]
    Transfer(TransferError),

    #[error("client error: {0}")]
    Client(ClientError),
}

impl UploadError {
    /// Rejected call details as `(url, status, body)`, or the rendered error
    /// when no response was involved.
    pub fn report(&self) -> (Option<String>, Option<u16>, String) {
        match self {
            Self::Protocol(failure) => (
                Some(failure.url.clone()),
                Some(failure.status),
                failure.body.clone(),
            ),
            other => (None, None, other.to_string()),
        }
    }
}

impl From<TransferError> for UploadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => Self::Io(e),
            TransferError::Validation(msg) | TransferError::InvalidPath(msg) => {
                Self::Validation(msg)
            }
            TransferError::FileTooLarge { size, max_bytes } => {
                Self::FileTooLarge { size, max_bytes }
            }
            other => Self::Transfer(other),
        }
    }
}

impl From<ClientError> for UploadError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Api(failure) => Self::Protocol(failure),
            ClientError::Validation(msg) => Self::Validation(msg),
            other => Self::Client(other),
        }
    }
}
