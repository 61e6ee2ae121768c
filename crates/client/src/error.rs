use std::fmt;

use fileservice_protocol::{ErrorCode, ErrorEnvelope};

use crate::transport::HttpResponse;

/// A non-success response the client could not handle itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub url: String,
    pub status: u16,
    /// Raw `ErrorCode` from a structured error body, if any.
    pub error_code: Option<String>,
    pub body: String,
}

impl ApiFailure {
    pub(crate) fn from_response(url: &str, response: &HttpResponse) -> Self {
        let body = response.text();
        let error_code = ErrorEnvelope::parse(&body).and_then(|env| env.code);
        Self {
            url: url.to_string(),
            status: response.status,
            error_code,
            body,
        }
    }

    /// Typed error code, if the service sent one this client understands.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code.as_deref().and_then(ErrorCode::from_name)
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} from {}", self.status, self.url)?;
        if let Some(code) = &self.error_code {
            write!(f, " [{code}]")?;
        }
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

/// Errors from the file service client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection, TLS, or timeout failure. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{0}")]
    Api(ApiFailure),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid argument: {0}")]
    Validation(String),

    /// The request could not be built, e.g. a malformed URL.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid value for header {name}")]
    InvalidHeader { name: String },

    #[error("access token unavailable: {0}")]
    Token(String),
}

impl ClientError {
    /// Whether the retry policy should try again after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::InvalidRequest(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
