//! Remote transport contract used by entity stores
//!
//! A transport performs request/response calls against the authority and
//! delivers unsolicited pushes. Wire format, handshake and authentication
//! live behind this trait.

use crate::core::error::{RemoteError, StoreError, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by transports
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Listener invoked with the `data` of every push for an event name
pub type PushHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Application-level answer to a remote call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// Structured error, when the authority rejected the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteResponse {
    /// Successful answer
    pub fn ok(data: Value) -> Self {
        Self { error: None, data: Some(data) }
    }

    /// Rejection
    pub fn err(error: RemoteError) -> Self {
        Self { error: Some(error), data: None }
    }

    /// Split into data or a store error
    pub fn into_result(self) -> Result<Value, StoreError> {
        match (self.error, self.data) {
            (Some(error), _) => Err(StoreError::Rejected(error)),
            (None, Some(data)) => Ok(data),
            (None, None) => Err(TransportError::Malformed("response carried neither data nor error".into()).into()),
        }
    }
}

/// Request/push channel to the remote authority
pub trait Transport: Send + Sync {
    /// Perform `operation` with `payload`.
    ///
    /// Resolves at most once. `Err` is reserved for transport-level
    /// failures; authority rejections arrive as `Ok` with `error` set.
    fn emit(&self, operation: &str, payload: Value) -> BoxFuture<'_, Result<RemoteResponse, TransportError>>;

    /// Register `handler` for pushes named `event`
    fn on_push(&self, event: &str, handler: PushHandler);
}
