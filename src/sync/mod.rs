//! Readiness gates and cross-store composers

pub mod composer;
pub mod gate;

pub use composer::{IdentityComposer, IDENTITIES_COMPOSED};
pub use gate::DependencyGate;
