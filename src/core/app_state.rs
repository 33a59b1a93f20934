//! Application State Management
//!
//! The central AppState owns the event bus, the transport handle, metrics
//! and one entity store per configured entity kind. Everything is passed
//! explicitly; nothing is a process-wide singleton.

use crate::bus::{EventBus, LifecycleEvent};
use crate::comms::Transport;
use crate::core::config::Config;
use crate::storage::EntityStore;
use crate::sync::DependencyGate;
use crate::system::metrics::Metrics;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Central application state holding all services and stores
pub struct AppState {
    /// Application configuration
    pub config: Config,

    /// Event bus shared by every store and consumer
    pub bus: EventBus,

    /// Connection to the remote authority
    pub transport: Arc<dyn Transport>,

    /// Metrics, when enabled
    pub metrics: Option<Arc<Metrics>>,

    /// Stores in configuration order
    stores: Vec<Arc<EntityStore>>,
}

impl AppState {
    /// Assemble an AppState from already-built parts.
    /// Called by the factory once every store is attached.
    pub fn new(
        config: Config,
        bus: EventBus,
        transport: Arc<dyn Transport>,
        metrics: Option<Arc<Metrics>>,
        stores: Vec<Arc<EntityStore>>,
    ) -> Self {
        Self {
            config,
            bus,
            transport,
            metrics,
            stores,
        }
    }

    /// Store registered under `plural`
    pub fn store(&self, plural: &str) -> Option<Arc<EntityStore>> {
        self.stores.iter().find(|store| store.name() == plural).cloned()
    }

    /// Every store, in configuration order
    pub fn stores(&self) -> &[Arc<EntityStore>] {
        &self.stores
    }

    /// Gate over every store
    pub fn gate_all(&self, completion_event: Option<String>) -> DependencyGate {
        DependencyGate::new(self.stores.clone(), self.bus.clone(), completion_event)
    }

    /// Announce a session lifecycle change to every store
    pub fn lifecycle(&self, event: LifecycleEvent) {
        info!(?event, stores = self.stores.len(), "lifecycle");
        self.bus.publish(event.event_name(), json!({}));
    }

    /// Announce application start; stores reset and retrieve
    pub fn start(&self) {
        self.lifecycle(LifecycleEvent::Startup);
    }
}
