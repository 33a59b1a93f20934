//! In-process authority implementing [`Transport`]
//!
//! Operations are answered by registered closures; operations without a
//! handler never answer, which lets callers exercise their timeouts.

use crate::comms::transport::{BoxFuture, PushHandler, RemoteResponse, Transport};
use crate::core::error::TransportError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

type OperationHandler = Arc<dyn Fn(Value) -> RemoteResponse + Send + Sync>;

/// Transport backed by closures living in the same process
pub struct MemoryTransport {
    operations: DashMap<String, OperationHandler>,
    listeners: DashMap<String, Vec<PushHandler>>,
    calls: Mutex<Vec<(String, Value)>>,
    connected: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryTransport {
    /// Transport answering immediately
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
            listeners: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Transport delaying every answer by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::new()
        }
    }

    /// Answer `operation` with `handler`, replacing any previous one
    pub fn handle<F>(&self, operation: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> RemoteResponse + Send + Sync + 'static,
    {
        self.operations.insert(operation.into(), Arc::new(handler));
    }

    /// Deliver a push to every listener of `event`; returns how many ran
    pub fn push(&self, event: &str, data: Value) -> usize {
        let snapshot: Vec<PushHandler> = match self.listeners.get(event) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        for listener in &snapshot {
            listener(data.clone());
        }
        snapshot.len()
    }

    /// While disconnected every call fails with [`TransportError::Disconnected`]
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Number of calls made to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|(name, _)| name == operation).count()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn emit(&self, operation: &str, payload: Value) -> BoxFuture<'_, Result<RemoteResponse, TransportError>> {
        trace!(operation, %payload, "memory transport call");
        self.calls.lock().push((operation.to_string(), payload.clone()));

        let connected = self.connected.load(Ordering::SeqCst);
        let handler = self.operations.get(operation).map(|entry| entry.value().clone());
        let latency = self.latency;

        Box::pin(async move {
            if !connected {
                return Err(TransportError::Disconnected);
            }
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            match handler {
                Some(handler) => Ok(handler(payload)),
                None => std::future::pending().await,
            }
        })
    }

    fn on_push(&self, event: &str, handler: PushHandler) {
        self.listeners.entry(event.to_string()).or_default().push(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn answers_registered_operations() {
        let transport = MemoryTransport::new();
        transport.handle("echo", RemoteResponse::ok);

        let response = transport.emit("echo", json!({ "a": 1 })).await.unwrap();
        assert_eq!(response.data, Some(json!({ "a": 1 })));
        assert_eq!(transport.call_count("echo"), 1);
    }

    #[tokio::test]
    async fn disconnected_calls_fail() {
        let transport = MemoryTransport::new();
        transport.handle("echo", RemoteResponse::ok);
        transport.set_connected(false);

        let err = transport.emit("echo", json!({})).await.unwrap_err();
        assert_eq!(err, TransportError::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_operation_never_answers() {
        let transport = MemoryTransport::new();
        let result = tokio::time::timeout(Duration::from_secs(60), transport.emit("missing", json!({}))).await;
        assert!(result.is_err());
    }

    #[test]
    fn push_fans_out() {
        let transport = MemoryTransport::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            transport.on_push("user", Arc::new(move |data| seen.lock().push(data)));
        }

        assert_eq!(transport.push("user", json!({ "changeType": "CREATE" })), 2);
        assert_eq!(transport.push("room", json!({})), 0);
        assert_eq!(seen.lock().len(), 2);
    }
}
