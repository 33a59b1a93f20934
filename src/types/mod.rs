//! Type definitions shared across the crate

pub mod entity;
pub mod events;

pub use entity::{Entity, ID_FIELD};
pub use events::{BulkChangeEvent, ChangeEvent, ChangeType, ErrorEvent};
