//! Named-event publish/subscribe registry
//!
//! Handlers are invoked synchronously, in registration order, on the
//! publishing thread. The handler list is snapshotted before delivery, so a
//! handler may subscribe or cancel (itself included) while being called.

use crate::core::error::Result;
use crate::system::metrics::Metrics;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Callback registered for an event
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Registered {
    id: u64,
    handler: Handler,
}

struct BusInner {
    handlers: DashMap<String, Vec<Registered>>,
    next_id: AtomicU64,
    metrics: Option<Arc<Metrics>>,
}

/// Process-wide event bus. Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a bus that counts publishes and handler panics
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self::build(Some(metrics))
    }

    fn build(metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
                metrics,
            }),
        }
    }

    /// Register `handler` for `event`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// cancelled or dropped. Use [`Subscription::detach`] to keep it for the
    /// lifetime of the bus.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let event = event.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .handlers
            .entry(event.clone())
            .or_default()
            .push(Registered { id, handler: Arc::new(handler) });

        Subscription {
            bus: Arc::downgrade(&self.inner),
            event,
            id,
            active: true,
        }
    }

    /// Deliver `payload` to every handler registered for `event`.
    ///
    /// A panicking handler is logged and does not prevent delivery to the
    /// handlers after it.
    pub fn publish(&self, event: &str, payload: Value) {
        debug!(event, %payload, "publish");

        if let Some(metrics) = &self.inner.metrics {
            metrics.events_published.with_label_values(&[event]).inc();
        }

        let snapshot: Vec<Handler> = match self.inner.handlers.get(event) {
            Some(entries) => entries.iter().map(|r| r.handler.clone()).collect(),
            None => return,
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(&payload))).is_err() {
                error!(event, "event handler panicked");
                if let Some(metrics) = &self.inner.metrics {
                    metrics.handler_panics.with_label_values(&[event]).inc();
                }
            }
        }
    }

    /// Serialize `payload` and publish it
    pub fn publish_typed<T: Serialize>(&self, event: &str, payload: &T) -> Result<()> {
        let value = serde_json::to_value(payload)?;
        self.publish(event, value);
        Ok(())
    }

    /// Number of live handlers for `event`
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner.handlers.get(event).map_or(0, |entries| entries.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.inner.handlers.len())
            .finish()
    }
}

/// Handle to a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    event: String,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Event this subscription listens to
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Unsubscribe now
    pub fn cancel(mut self) {
        self.remove();
    }

    /// Keep the handler registered for as long as the bus lives
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        let Some(bus) = self.bus.upgrade() else {
            return;
        };

        let now_empty = match bus.handlers.get_mut(&self.event) {
            Some(mut entries) => {
                entries.retain(|r| r.id != self.id);
                entries.is_empty()
            }
            None => false,
        };
        if now_empty {
            bus.handlers.remove_if(&self.event, |_, entries| entries.is_empty());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(bus: &EventBus, event: &str, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
        let log = log.clone();
        bus.subscribe(event, move |payload| {
            log.lock().push(format!("{}:{}", tag, payload));
        })
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = recorder(&bus, "user", "a", &log);
        let _b = recorder(&bus, "user", "b", &log);
        let _other = recorder(&bus, "room", "c", &log);

        bus.publish("user", json!(1));

        assert_eq!(*log.lock(), vec!["a:1".to_string(), "b:1".to_string()]);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish("nobody", json!({ "x": 1 }));
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }

    #[test]
    fn cancel_and_drop_unsubscribe() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&bus, "user", "a", &log);
        let b = recorder(&bus, "user", "b", &log);
        assert_eq!(bus.subscriber_count("user"), 2);

        a.cancel();
        bus.publish("user", json!(1));
        drop(b);
        bus.publish("user", json!(2));

        assert_eq!(*log.lock(), vec!["b:1".to_string()]);
        assert_eq!(bus.subscriber_count("user"), 0);
    }

    #[test]
    fn detached_handler_survives() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&bus, "user", "a", &log).detach();

        bus.publish("user", json!(1));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let bus = EventBus::with_metrics(metrics.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _boom = bus.subscribe("user", |_| panic!("boom"));
        let _after = recorder(&bus, "user", "after", &log);

        bus.publish("user", json!(1));

        assert_eq!(*log.lock(), vec!["after:1".to_string()]);
        assert_eq!(metrics.handler_panics.with_label_values(&["user"]).get(), 1);
        assert_eq!(metrics.events_published.with_label_values(&["user"]).get(), 1);
    }

    #[test]
    fn subscribing_during_publish_uses_snapshot() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let late: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let inner_log = log.clone();
        let inner_late = late.clone();
        let _outer = bus.subscribe("user", move |_| {
            let sub = recorder(&inner_bus, "user", "late", &inner_log);
            inner_late.lock().push(sub);
        });

        bus.publish("user", json!(1));
        assert!(log.lock().is_empty());

        bus.publish("user", json!(2));
        assert_eq!(*log.lock(), vec!["late:2".to_string()]);
    }

    #[test]
    fn publish_typed_serializes() {
        #[derive(Serialize)]
        struct Ping {
            count: u32,
        }

        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _sub = recorder(&bus, "ping", "p", &log);

        bus.publish_typed("ping", &Ping { count: 3 }).unwrap();
        assert_eq!(*log.lock(), vec![r#"p:{"count":3}"#.to_string()]);
    }
}
