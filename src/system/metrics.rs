//! Metrics collection for the sync core
//!
//! Each [`Metrics`] owns its own Prometheus registry so several application
//! states (and tests) can coexist in one process.

use crate::core::error::Result;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Outcome label for remote calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The authority returned data
    Ok,
    /// The authority returned a structured error
    Rejected,
    /// The call failed or timed out
    Failed,
}

impl CallOutcome {
    fn as_str(self) -> &'static str {
        match self {
            CallOutcome::Ok => "ok",
            CallOutcome::Rejected => "rejected",
            CallOutcome::Failed => "failed",
        }
    }
}

/// Centralized metrics for the bus and every store
pub struct Metrics {
    registry: Registry,
    /// Events published on the bus, by event name
    pub events_published: IntCounterVec,
    /// Handler panics caught during publish, by event name
    pub handler_panics: IntCounterVec,
    /// Remote calls issued by stores, by store, operation and outcome
    pub remote_calls: IntCounterVec,
    /// Remote call latency in seconds, by store and operation
    pub remote_call_duration: HistogramVec,
    /// Push notifications applied, by store and change type
    pub pushes_applied: IntCounterVec,
    /// Entities currently cached, by store
    pub store_entities: IntGaugeVec,
}

impl Metrics {
    /// Create a metrics set registered on a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_published = IntCounterVec::new(
            Opts::new("es_events_published_total", "Total events published on the bus"),
            &["event"],
        )?;
        let handler_panics = IntCounterVec::new(
            Opts::new("es_handler_panics_total", "Total subscriber panics caught during publish"),
            &["event"],
        )?;
        let remote_calls = IntCounterVec::new(
            Opts::new("es_remote_calls_total", "Total remote calls issued by stores"),
            &["store", "operation", "outcome"],
        )?;
        let remote_call_duration = HistogramVec::new(
            HistogramOpts::new("es_remote_call_duration_seconds", "Duration of remote calls in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["store", "operation"],
        )?;
        let pushes_applied = IntCounterVec::new(
            Opts::new("es_push_applied_total", "Total push notifications applied"),
            &["store", "change"],
        )?;
        let store_entities = IntGaugeVec::new(
            Opts::new("es_store_entities", "Entities currently cached per store"),
            &["store"],
        )?;

        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(handler_panics.clone()))?;
        registry.register(Box::new(remote_calls.clone()))?;
        registry.register(Box::new(remote_call_duration.clone()))?;
        registry.register(Box::new(pushes_applied.clone()))?;
        registry.register(Box::new(store_entities.clone()))?;

        Ok(Self {
            registry,
            events_published,
            handler_panics,
            remote_calls,
            remote_call_duration,
            pushes_applied,
            store_entities,
        })
    }

    /// Underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count a remote call and record how long it took
    pub fn record_call(&self, store: &str, operation: &str, outcome: CallOutcome, started: Instant) {
        self.remote_calls
            .with_label_values(&[store, operation, outcome.as_str()])
            .inc();
        self.remote_call_duration
            .with_label_values(&[store, operation])
            .observe(started.elapsed().as_secs_f64());
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let families = self.registry.gather();
        Ok(TextEncoder::new().encode_to_string(&families)?)
    }
}
