//! Event bus decoupling state producers from consumers

pub mod event_bus;
pub mod events;

pub use event_bus::{EventBus, Handler, Subscription};
pub use events::LifecycleEvent;
