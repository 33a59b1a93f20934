//! Application Factory
//!
//! Builds an [`AppState`] from configuration: metrics, bus, and one attached
//! entity store per `[[stores]]` entry.

use crate::bus::EventBus;
use crate::comms::Transport;
use crate::core::app_state::AppState;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::storage::EntityStore;
use crate::system::metrics::Metrics;
use std::sync::Arc;

/// Create an AppState over `transport`.
///
/// The configuration is validated first; stores are attached (push and
/// lifecycle hooks registered) but nothing is fetched until
/// [`AppState::start`] or another lifecycle event.
pub fn create_app_state(config: Config, transport: Arc<dyn Transport>) -> Result<AppState> {
    config.validate()?;
    tracing::info!("Creating AppState with {} stores", config.stores.len());

    let metrics = if config.metrics.enabled {
        Some(Arc::new(Metrics::new()?))
    } else {
        None
    };

    let bus = match &metrics {
        Some(metrics) => EventBus::with_metrics(metrics.clone()),
        None => EventBus::new(),
    };

    let stores = config
        .stores
        .iter()
        .map(|definition| {
            let mut store = EntityStore::new(definition.clone(), bus.clone(), transport.clone())
                .with_timeout(config.timeout_for(definition))
                .with_error_event(config.sync.error_event.clone());
            if let Some(metrics) = &metrics {
                store = store.with_metrics(metrics.clone());
            }

            let store = Arc::new(store);
            store.attach();
            tracing::debug!("Store {} ready for sync", definition.plural);
            store
        })
        .collect();

    Ok(AppState::new(config, bus, transport, metrics, stores))
}
