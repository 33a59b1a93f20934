//! Payloads published on the bus by entity stores

use crate::core::error::RemoteError;
use crate::types::entity::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change carried by a push or a local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    /// Entity created
    Create,
    /// Entity fields changed
    Update,
    /// Entity retired
    Remove,
}

impl ChangeType {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Remove => "REMOVE",
        }
    }

    /// Parse a wire name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "CREATE" => Some(ChangeType::Create),
            "UPDATE" => Some(ChangeType::Update),
            "REMOVE" => Some(ChangeType::Remove),
            _ => None,
        }
    }
}

/// Published on a store's single-change event.
///
/// For [`ChangeType::Remove`] the entity carries only its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// What happened
    pub change_type: ChangeType,
    /// Merged entity, or identifier-only shape on removal
    pub entity: Entity,
}

/// Published on a store's bulk-change event after a full retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkChangeEvent {
    /// Every entity returned by the retrieval
    pub entities: Vec<Entity>,
    /// Whether the cache was cleared first
    pub reset: bool,
}

/// Published on the generic error event when a retrieval fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    /// Plural object type of the failing store
    pub object_type: String,
    /// Remote operation that failed
    pub operation: String,
    /// Request payload that was sent
    pub params: Value,
    /// Human-readable failure
    pub message: String,
    /// Structured authority error, when there was one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}
