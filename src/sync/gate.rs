//! Dependency gate - waits for several stores' first fetch
//!
//! The gate joins the stores' readiness futures and fires its completion
//! exactly once. It drives itself: a join task is spawned on the ambient
//! runtime at construction, and every completion query re-checks the stores.
//! Callbacks registered after completion run immediately.

use crate::bus::EventBus;
use crate::storage::EntityStore;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

type Callback = Box<dyn FnOnce() + Send>;

struct GateShared {
    stores: Vec<Arc<EntityStore>>,
    bus: EventBus,
    completion_event: Option<String>,
    complete: watch::Sender<bool>,
    pending: Mutex<Vec<Callback>>,
}

/// Completion barrier over a set of stores
pub struct DependencyGate {
    shared: Arc<GateShared>,
}

impl DependencyGate {
    /// Gate over `stores`, publishing `completion_event` (if any) once.
    ///
    /// Completes right away when every store has already fetched; otherwise
    /// a join task is spawned when a tokio runtime is available.
    pub fn new(stores: Vec<Arc<EntityStore>>, bus: EventBus, completion_event: Option<String>) -> Self {
        let (complete, _) = watch::channel(false);
        let gate = Self {
            shared: Arc::new(GateShared {
                stores,
                bus,
                completion_event,
                complete,
                pending: Mutex::new(Vec::new()),
            }),
        };

        if !gate.is_complete() {
            gate.drive();
        }
        gate
    }

    /// Whether every dependency has fetched
    pub fn is_complete(&self) -> bool {
        if *self.shared.complete.borrow() {
            return true;
        }
        if self.shared.stores.iter().all(|store| store.has_fetched()) {
            self.shared.finish();
            return true;
        }
        false
    }

    /// Stores this gate depends on
    pub fn stores(&self) -> &[Arc<EntityStore>] {
        &self.shared.stores
    }

    /// Wait for every dependency, then complete the gate
    pub async fn wait(&self) {
        self.shared.join().await;
    }

    /// Drive the gate on the current runtime
    pub fn spawn(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move { shared.join().await })
    }

    /// Run `callback` on completion, or right away if already complete
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.is_complete();

        let mut pending = self.shared.pending.lock();
        if *self.shared.complete.borrow() {
            drop(pending);
            callback();
        } else {
            pending.push(Box::new(callback));
        }
    }

    fn drive(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; gate completes when queried or awaited");
            return;
        };

        let stores = self.shared.stores.clone();
        let shared: Weak<GateShared> = Arc::downgrade(&self.shared);
        runtime.spawn(async move {
            for store in &stores {
                store.ready().await;
            }
            if let Some(shared) = shared.upgrade() {
                shared.finish();
            }
        });
    }
}

impl GateShared {
    async fn join(&self) {
        for store in &self.stores {
            store.ready().await;
        }
        self.finish();
    }

    fn finish(&self) {
        if !self.complete.send_if_modified(|complete| !std::mem::replace(complete, true)) {
            return;
        }

        info!(
            stores = self.stores.len(),
            event = self.completion_event.as_deref().unwrap_or("-"),
            "dependencies ready"
        );

        let callbacks = std::mem::take(&mut *self.pending.lock());
        for callback in callbacks {
            callback();
        }

        if let Some(event) = &self.completion_event {
            self.bus.publish(event, json!({}));
        }
    }
}

impl std::fmt::Debug for DependencyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGate")
            .field("stores", &self.shared.stores.len())
            .field("complete", &*self.shared.complete.borrow())
            .finish()
    }
}
