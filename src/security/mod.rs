//! Access control for cached objects

pub mod access;

pub use access::{evaluate, AccessDecision, AccessLevel, AccessTarget, AuthContext};
