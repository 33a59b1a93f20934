//! Composers - read-only queries across several stores
//!
//! A composer answers only once its gate has completed; before that every
//! query returns `None`/`false`.

use crate::bus::EventBus;
use crate::storage::EntityStore;
use crate::sync::gate::DependencyGate;
use crate::types::Entity;
use std::sync::Arc;

/// Completion event published by [`IdentityComposer`]
pub const IDENTITIES_COMPOSED: &str = "identitiesComposed";

/// Resolves identities that may belong to a user or to one of their aliases
pub struct IdentityComposer {
    gate: Arc<DependencyGate>,
    users: Arc<EntityStore>,
    aliases: Arc<EntityStore>,
}

impl IdentityComposer {
    /// Compose over a users store and an aliases store
    pub fn new(bus: EventBus, users: Arc<EntityStore>, aliases: Arc<EntityStore>) -> Self {
        let gate = DependencyGate::new(
            vec![users.clone(), aliases.clone()],
            bus,
            Some(IDENTITIES_COMPOSED.to_string()),
        );
        Self {
            gate: Arc::new(gate),
            users,
            aliases,
        }
    }

    /// Gate guarding this composer
    pub fn gate(&self) -> &Arc<DependencyGate> {
        &self.gate
    }

    /// Wait until both stores have fetched
    pub async fn ready(&self) {
        self.gate.wait().await;
    }

    /// Display name for a user id (`username`) or alias id (`aliasName`)
    pub fn display_name(&self, id: &str) -> Option<String> {
        if !self.gate.is_complete() {
            return None;
        }

        if let Some(user) = self.users.get_one(id) {
            return user.get_str("username").map(str::to_owned);
        }
        self.aliases
            .get_one(id)
            .and_then(|alias| alias.get_str("aliasName").map(str::to_owned))
    }

    /// Whether `id` names a known alias
    pub fn is_alias(&self, id: &str) -> bool {
        self.gate.is_complete() && self.aliases.get_one(id).is_some()
    }

    /// User owning the alias `alias_id`
    pub fn owner_of_alias(&self, alias_id: &str) -> Option<Entity> {
        if !self.gate.is_complete() {
            return None;
        }
        let owner_id = self.aliases.get_one(alias_id)?.get_str("ownerId")?.to_owned();
        self.users.get_one(&owner_id)
    }
}
