//! Error types and handling for the entity sync core
//!
//! Store operations never panic on expected failures; they resolve with a
//! [`StoreError`] that mirrors the three failure classes a caller can see:
//! an unsupported capability, a rejection from the authority, or a transport
//! failure (including timeouts).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Entity store operation errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Transport errors raised outside of a store operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single entity store operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store was not configured with a remote operation for this call.
    /// No remote call is made.
    #[error("{operation} is not supported for {object_type}")]
    Unsupported {
        /// Name of the store operation that was invoked
        operation: &'static str,
        /// Plural object type of the store
        object_type: String,
    },

    /// The authority answered with a structured error
    #[error("Request rejected: {0}")]
    Rejected(RemoteError),

    /// The call never produced an application-level answer
    #[error("{0}")]
    Transport(#[from] TransportError),
}

impl StoreError {
    /// Structured remote error, if the authority rejected the call
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            StoreError::Rejected(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the failure came from a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Transport(TransportError::Timeout { .. }))
    }
}

/// Transport-level failures, distinct from application errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// No answer arrived within the configured window
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Remote operation name
        operation: String,
        /// Timeout that elapsed
        after: Duration,
    },

    /// The transport dropped the request without answering
    #[error("Transport disconnected")]
    Disconnected,

    /// The answer could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Kind tag carried by an authority error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteErrorKind {
    /// A field was too short or too long
    InvalidLength,
    /// A field contained forbidden characters
    InvalidCharacters,
    /// The object already exists
    AlreadyExists,
    /// The subject is not allowed to perform the action
    NotAllowed,
    /// The object does not exist
    DoesNotExist,
    /// The subject is banned
    Banned,
    /// The subject must verify before acting
    NeedsVerification,
    /// Any tag this client does not know about
    #[serde(other)]
    General,
}

/// Extra context attached to a remote error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraData {
    /// Name of the offending field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

/// Structured error returned by the authority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    /// Error kind
    #[serde(rename = "type")]
    pub kind: RemoteErrorKind,
    /// Optional field-level detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<ExtraData>,
}

impl RemoteError {
    /// Create an error without extra data
    pub fn new(kind: RemoteErrorKind) -> Self {
        Self { kind, extra_data: None }
    }

    /// Create an error naming the offending field
    pub fn with_param(kind: RemoteErrorKind, param: impl Into<String>) -> Self {
        Self {
            kind,
            extra_data: Some(ExtraData { param: Some(param.into()) }),
        }
    }

    /// Offending field, if any
    pub fn param(&self) -> Option<&str> {
        self.extra_data.as_ref().and_then(|extra| extra.param.as_deref())
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.param() {
            Some(param) => write!(f, "{:?} ({})", self.kind, param),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
