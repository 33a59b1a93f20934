//! Entity records
//!
//! An entity is a plain map of named fields that always carries an
//! `objectId`. The owning store holds the canonical copy; everything handed
//! out is a clone.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field holding an entity's unique identifier
pub const ID_FIELD: &str = "objectId";

/// A structured record identified by `objectId`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Entity carrying only an identifier
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(ID_FIELD.to_string(), Value::String(id.into()));
        Self(fields)
    }

    /// Build from a JSON value; `None` unless it is an object with a string id
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => {
                let entity = Self(fields);
                entity.id().is_some().then_some(entity)
            }
            _ => None,
        }
    }

    /// Unique identifier
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Field value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// String field value
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Set a field, returning self for chaining
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Overwrite fields present in `update`, keeping the rest
    pub fn merge(&mut self, update: &Entity) {
        for (key, value) in &update.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Copy reduced to the identifier, as published for removals
    pub fn identifier_only(&self) -> Entity {
        match self.id() {
            Some(id) => Entity::with_id(id),
            None => Entity::default(),
        }
    }

    /// All fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON object value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_only_present_fields() {
        let mut user = Entity::with_id("u1").set("username", "ann").set("accessLevel", 1);
        let update = Entity::with_id("u1").set("accessLevel", 4);

        user.merge(&update);

        assert_eq!(user.get("accessLevel"), Some(&json!(4)));
        assert_eq!(user.get_str("username"), Some("ann"));
    }

    #[test]
    fn from_value_requires_string_id() {
        assert!(Entity::from_value(json!({ "objectId": "a" })).is_some());
        assert!(Entity::from_value(json!({ "objectId": 7 })).is_none());
        assert!(Entity::from_value(json!({ "name": "x" })).is_none());
        assert!(Entity::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn identifier_only_strips_fields() {
        let room = Entity::with_id("r1").set("roomName", "lobby");
        assert_eq!(room.identifier_only(), Entity::with_id("r1"));
    }
}
