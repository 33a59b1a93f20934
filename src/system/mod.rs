//! System utilities and monitoring
//!
//! Prometheus metrics for the bus and the entity stores.

pub mod metrics;

pub use metrics::{CallOutcome, Metrics};
