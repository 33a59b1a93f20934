//! Static description of one entity kind

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote operations a store may be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fetch a single entity
    RetrieveOne,
    /// Fetch the full collection
    RetrieveMany,
    /// Create an entity
    Create,
    /// Update an entity
    Update,
    /// Remove an entity
    Remove,
}

impl Operation {
    /// Name used in logs and errors
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::RetrieveOne => "retrieveOne",
            Operation::RetrieveMany => "retrieveAll",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Remove => "remove",
        }
    }
}

/// Object types, event names, remote operations and push events of a kind.
///
/// Missing operation names disable the matching store capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDefinition {
    /// Payload key for one entity (`user`)
    pub singular: String,
    /// Payload key for a collection (`users`); also the store's name
    pub plural: String,
    /// Single-change event name; defaults to `singular`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single_event: Option<String>,
    /// Bulk-change event name; defaults to `plural`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub many_event: Option<String>,
    /// Remote operation for fetching one entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieve_one: Option<String>,
    /// Remote operation for fetching the collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieve_many: Option<String>,
    /// Remote operation for creating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    /// Remote operation for updating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    /// Remote operation for removing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<String>,
    /// Push events carrying server-initiated changes
    #[serde(default)]
    pub push_events: Vec<String>,
    /// Per-store override of the request timeout
    #[serde(
        default,
        with = "crate::core::config::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

impl StoreDefinition {
    /// Definition with object types only; every capability disabled
    pub fn new(singular: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            singular: singular.into(),
            plural: plural.into(),
            single_event: None,
            many_event: None,
            retrieve_one: None,
            retrieve_many: None,
            create: None,
            update: None,
            remove: None,
            push_events: Vec::new(),
            timeout: None,
        }
    }

    /// Set the remote operation for `operation`
    pub fn with_operation(mut self, operation: Operation, name: impl Into<String>) -> Self {
        let slot = match operation {
            Operation::RetrieveOne => &mut self.retrieve_one,
            Operation::RetrieveMany => &mut self.retrieve_many,
            Operation::Create => &mut self.create,
            Operation::Update => &mut self.update,
            Operation::Remove => &mut self.remove,
        };
        *slot = Some(name.into());
        self
    }

    /// Listen to `event` for pushes
    pub fn with_push_event(mut self, event: impl Into<String>) -> Self {
        self.push_events.push(event.into());
        self
    }

    /// Override the event names
    pub fn with_events(mut self, single: impl Into<String>, many: impl Into<String>) -> Self {
        self.single_event = Some(single.into());
        self.many_event = Some(many.into());
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remote name configured for `operation`
    pub fn operation(&self, operation: Operation) -> Option<&str> {
        match operation {
            Operation::RetrieveOne => self.retrieve_one.as_deref(),
            Operation::RetrieveMany => self.retrieve_many.as_deref(),
            Operation::Create => self.create.as_deref(),
            Operation::Update => self.update.as_deref(),
            Operation::Remove => self.remove.as_deref(),
        }
    }

    /// Single-change event name
    pub fn single_event(&self) -> &str {
        self.single_event.as_deref().unwrap_or(&self.singular)
    }

    /// Bulk-change event name
    pub fn many_event(&self) -> &str {
        self.many_event.as_deref().unwrap_or(&self.plural)
    }

    /// Conventional full definition: `get<Plural>`, `create<Singular>`, ...
    /// and a push event named after the singular type
    pub fn conventional(singular: &str, plural: &str) -> Self {
        let upper = |name: &str| {
            let mut chars = name.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        };
        let (one, many) = (upper(singular), upper(plural));

        Self::new(singular, plural)
            .with_operation(Operation::RetrieveOne, format!("get{}", one))
            .with_operation(Operation::RetrieveMany, format!("get{}", many))
            .with_operation(Operation::Create, format!("create{}", one))
            .with_operation(Operation::Update, format!("update{}", one))
            .with_operation(Operation::Remove, format!("remove{}", one))
            .with_push_event(singular)
    }
}
