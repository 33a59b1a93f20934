//! Entity Sync - client-side state synchronisation core
//!
//! Keeps local caches of remote entity collections in sync with an
//! authoritative server over a request/push transport, notifies consumers of
//! every change through an event bus, and evaluates per-object access for the
//! current subject.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;

// Main functional modules
pub mod bus;
pub mod comms;
pub mod query;
pub mod security;
pub mod storage;
pub mod sync;
pub mod system;
pub mod types;

// Re-export commonly used items for convenience
pub use bus::{EventBus, LifecycleEvent, Subscription};
pub use comms::{MemoryTransport, RemoteResponse, Transport};
pub use core::{create_app_state, AppState, Config, Error, Result, StoreError};
pub use query::{Filter, FilterRule, Sorting};
pub use security::{evaluate, AccessDecision, AccessLevel, AccessTarget, AuthContext};
pub use storage::{EntityStore, StoreDefinition};
pub use sync::{DependencyGate, IdentityComposer};
pub use types::{ChangeType, Entity};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
