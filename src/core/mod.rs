//! Core system types and foundations
//!
//! Error handling, configuration, logging setup and the application state
//! that wires stores, bus and transport together.

pub mod app_state;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;

// Re-export commonly used items
pub use app_state::AppState;
pub use config::Config;
pub use error::{Error, Result, StoreError};
pub use factory::create_app_state;
