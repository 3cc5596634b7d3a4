// Error handling module
// Errors surfaced to callers of the client and raised by transports

use thiserror::Error;

/// Errors returned by [`crate::ApiClient`] operations
#[derive(Error, Debug)]
pub enum ClientError {
    /// Credentials were rejected, or a refreshed token was rejected again
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Non-retryable error response from the API
    #[error("Request failed: {status} - {message}")]
    RequestFailed {
        status: u16,
        message: String,
        body: String,
    },

    /// Transient failures persisted past the retry cap
    #[error("Transport failed after {attempts} attempt(s): {message}")]
    TransportFailed {
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    /// Invalid configuration or request construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal condition
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Whether a caller may reasonably retry the whole operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::TransportFailed { .. })
    }

    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::RequestFailed { status, .. } => Some(*status),
            ClientError::TransportFailed { status, .. } => *status,
            _ => None,
        }
    }
}

/// Category of a transport-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    Decode,
    /// The request could not be built (bad URL, header, ...)
    Builder,
    Unknown,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connection_failed",
            TransportErrorKind::Request => "request_error",
            TransportErrorKind::Body => "body_error",
            TransportErrorKind::Decode => "decode_error",
            TransportErrorKind::Builder => "builder_error",
            TransportErrorKind::Unknown => "unknown",
        }
    }
}

/// Failure to obtain any HTTP response at all
#[derive(Error, Debug, Clone)]
#[error("{message} (kind: {})", .kind.as_str())]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_builder() {
            TransportErrorKind::Builder
        } else if e.is_request() {
            TransportErrorKind::Request
        } else if e.is_body() {
            TransportErrorKind::Body
        } else if e.is_decode() {
            TransportErrorKind::Decode
        } else {
            TransportErrorKind::Unknown
        };
        Self::new(kind, e.to_string())
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
