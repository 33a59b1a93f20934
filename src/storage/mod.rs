//! Entity stores
//!
//! One [`EntityStore`] per entity kind (users, rooms, messages, ...), each
//! described by a [`StoreDefinition`].

pub mod definition;
pub mod entity_store;

pub use definition::{Operation, StoreDefinition};
pub use entity_store::{EntityStore, RetrieveOptions, DEFAULT_TIMEOUT};
