//! Entity store - local cache of one entity kind kept in sync with the authority
//!
//! Every change, whether pushed by the authority or caused by a local
//! mutation, goes through the same path: patch the map, then publish on the
//! bus. The map is only ever touched by the store's own methods.
//!
//! The lock guarding the map is never held across an await point or while
//! publishing, so handlers may read the store they are notified about.

use crate::bus::events::{self, LifecycleEvent};
use crate::bus::{EventBus, Subscription};
use crate::comms::Transport;
use crate::core::error::{StoreError, TransportError};
use crate::query::{apply_sort, Filter, Sorting};
use crate::storage::definition::{Operation, StoreDefinition};
use crate::system::metrics::{CallOutcome, Metrics};
use crate::types::{BulkChangeEvent, ChangeEvent, ChangeType, Entity, ErrorEvent, ID_FIELD};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Default timeout for remote calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for [`EntityStore::retrieve_one`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieveOptions {
    /// Publish the change (and any failure) on the bus
    pub notify: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self { notify: true }
    }
}

impl RetrieveOptions {
    /// Fetch without publishing anything
    pub fn silent() -> Self {
        Self { notify: false }
    }
}

/// Local cache of one entity kind
pub struct EntityStore {
    definition: StoreDefinition,
    objects: RwLock<HashMap<String, Entity>>,
    fetched: watch::Sender<bool>,
    bus: EventBus,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    error_event: String,
    metrics: Option<Arc<Metrics>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EntityStore {
    /// Create a store for `definition`.
    ///
    /// A store without a retrieve-many operation has nothing to wait for and
    /// starts out fetched.
    pub fn new(definition: StoreDefinition, bus: EventBus, transport: Arc<dyn Transport>) -> Self {
        let timeout = definition.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let (fetched, _) = watch::channel(definition.retrieve_many.is_none());

        Self {
            definition,
            objects: RwLock::new(HashMap::new()),
            fetched,
            bus,
            transport,
            timeout,
            error_event: events::ERROR.to_string(),
            metrics: None,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Override the remote call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Publish failures on `event` instead of the default error event
    pub fn with_error_event(mut self, event: impl Into<String>) -> Self {
        self.error_event = event.into();
        self
    }

    /// Record calls, pushes and cache size
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register push listeners with the transport and lifecycle hooks with
    /// the bus. Call once, after wrapping the store in an `Arc`.
    pub fn attach(self: &Arc<Self>) {
        for event in &self.definition.push_events {
            let store = Arc::downgrade(self);
            self.transport.on_push(
                event,
                Arc::new(move |data: Value| {
                    if let Some(store) = store.upgrade() {
                        store.handle_push(&data);
                    }
                }),
            );
        }

        let mut subscriptions = self.subscriptions.lock();
        for lifecycle in LifecycleEvent::ALL {
            let store: Weak<Self> = Arc::downgrade(self);
            subscriptions.push(self.bus.subscribe(lifecycle.event_name(), move |_| {
                if let Some(store) = store.upgrade() {
                    store.spawn_lifecycle(lifecycle);
                }
            }));
        }

        debug!(store = %self.definition.plural, "attached");
    }

    /// Static description of this store
    pub fn definition(&self) -> &StoreDefinition {
        &self.definition
    }

    /// Plural object type, used as the store's name
    pub fn name(&self) -> &str {
        &self.definition.plural
    }

    /// Whether the first full retrieval has completed, successfully or not
    pub fn has_fetched(&self) -> bool {
        *self.fetched.borrow()
    }

    /// Resolves once the first full retrieval has completed
    pub async fn ready(&self) {
        let mut receiver = self.fetched.subscribe();
        // The sender lives as long as the store, so this cannot fail.
        let _ = receiver.wait_for(|fetched| *fetched).await;
    }

    /// Cached entity for `id`
    pub fn get_one(&self, id: &str) -> Option<Entity> {
        self.objects.read().get(id).cloned()
    }

    /// Cached entities matching `filter`, ordered by `sorting`.
    ///
    /// Returns copies; without a sorting the order is unspecified.
    pub fn get_many(&self, filter: Option<&Filter>, sorting: Option<&Sorting>) -> Vec<Entity> {
        let snapshot: Vec<Entity> = self.objects.read().values().cloned().collect();

        let mut entities = match filter {
            Some(filter) => crate::query::apply_filter(snapshot, filter),
            None => snapshot,
        };
        if let Some(sorting) = sorting {
            apply_sort(&mut entities, sorting);
        }
        entities
    }

    /// Identifiers of every cached entity
    pub fn ids(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Number of cached entities
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Drop every cached entity and announce the empty set
    pub fn reset(&self) {
        self.objects.write().clear();
        self.refresh_gauge();
        info!(store = %self.definition.plural, "reset");
        self.publish(
            self.definition.many_event(),
            &BulkChangeEvent { entities: Vec::new(), reset: true },
        );
    }

    /// Fetch the full collection, optionally clearing the cache first.
    ///
    /// Readiness is set whatever the outcome so dependents never wait forever.
    pub async fn retrieve_all(&self, reset: bool) -> Result<Vec<Entity>, StoreError> {
        let params = json!({});
        let result = match self.call(Operation::RetrieveMany, params.clone()).await {
            Ok(data) => self.extract_many(&data),
            Err(err) => Err(err),
        };

        match result {
            Ok(entities) => {
                {
                    let mut objects = self.objects.write();
                    if reset {
                        objects.clear();
                    }
                    for entity in &entities {
                        objects.insert(entity_id(entity), entity.clone());
                    }
                }
                self.refresh_gauge();
                self.mark_fetched();
                info!(store = %self.definition.plural, count = entities.len(), reset, "retrieved");

                self.publish(
                    self.definition.many_event(),
                    &BulkChangeEvent { entities: entities.clone(), reset },
                );
                Ok(entities)
            }
            Err(err) => {
                self.mark_fetched();
                if !matches!(err, StoreError::Unsupported { .. }) {
                    self.publish_error(Operation::RetrieveMany, params, &err);
                }
                Err(err)
            }
        }
    }

    /// Fetch one entity and merge it into the cache
    pub async fn retrieve_one(&self, params: Value, options: RetrieveOptions) -> Result<Entity, StoreError> {
        let result = match self.call(Operation::RetrieveOne, params.clone()).await {
            Ok(data) => self.extract_one(&data),
            Err(err) => Err(err),
        };

        match result {
            Ok(entity) => {
                let merged = self.merge_in(entity);
                if options.notify {
                    self.publish_change(ChangeType::Update, merged.clone());
                }
                Ok(merged)
            }
            Err(err) => {
                if options.notify && !matches!(err, StoreError::Unsupported { .. }) {
                    self.publish_error(Operation::RetrieveOne, params, &err);
                }
                Err(err)
            }
        }
    }

    /// Ask the authority to create an entity and cache the result
    pub async fn create(&self, params: Value) -> Result<Entity, StoreError> {
        let data = self.call(Operation::Create, params).await?;
        let entity = self.extract_one(&data)?;

        self.objects.write().insert(entity_id(&entity), entity.clone());
        self.refresh_gauge();
        self.publish_change(ChangeType::Create, entity.clone());
        Ok(entity)
    }

    /// Ask the authority to update an entity and merge the returned fields
    pub async fn update(&self, params: Value) -> Result<Entity, StoreError> {
        let data = self.call(Operation::Update, params).await?;
        let entity = self.extract_one(&data)?;

        let merged = self.merge_in(entity);
        self.publish_change(ChangeType::Update, merged.clone());
        Ok(merged)
    }

    /// Ask the authority to remove an entity and retire its slot.
    ///
    /// The id is taken from the response when present, otherwise from the
    /// request's `<singular>Id` or `objectId` field.
    pub async fn remove(&self, params: Value) -> Result<String, StoreError> {
        let data = self.call(Operation::Remove, params.clone()).await?;

        let id = data
            .get(&self.definition.singular)
            .and_then(|entity| entity.get(ID_FIELD))
            .or_else(|| params.get(format!("{}Id", self.definition.singular)))
            .or_else(|| params.get(ID_FIELD))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TransportError::Malformed("removal did not identify an entity".into()))?;

        self.objects.write().remove(&id);
        self.refresh_gauge();
        self.publish_change(ChangeType::Remove, Entity::with_id(id.clone()));
        Ok(id)
    }

    /// Apply a server-initiated change.
    ///
    /// Unknown change types and payloads without an entity are logged and
    /// dropped without touching the cache.
    pub fn handle_push(&self, data: &Value) {
        let change_name = data.get("changeType").and_then(Value::as_str);
        let Some(change_type) = change_name.and_then(ChangeType::parse) else {
            warn!(store = %self.definition.plural, change = ?change_name, "dropping push with unrecognized change type");
            return;
        };
        let Some(entity) = data
            .get(&self.definition.singular)
            .cloned()
            .and_then(Entity::from_value)
        else {
            warn!(store = %self.definition.plural, "dropping push without a valid {}", self.definition.singular);
            return;
        };

        let published = match change_type {
            ChangeType::Create => {
                self.objects.write().insert(entity_id(&entity), entity.clone());
                entity
            }
            ChangeType::Update => self.merge_in(entity),
            ChangeType::Remove => {
                self.objects.write().remove(&entity_id(&entity));
                entity.identifier_only()
            }
        };

        self.refresh_gauge();
        if let Some(metrics) = &self.metrics {
            metrics
                .pushes_applied
                .with_label_values(&[self.definition.plural.as_str(), change_type.as_str()])
                .inc();
        }
        self.publish_change(change_type, published);
    }

    /// React to a session lifecycle notification
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) {
        debug!(store = %self.definition.plural, ?event, "lifecycle");
        // Failures are already published on the error event.
        let _ = self.retrieve_all(event.resets()).await;
    }

    fn spawn_lifecycle(self: Arc<Self>, event: LifecycleEvent) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { self.handle_lifecycle(event).await });
            }
            Err(_) => {
                warn!(store = %self.definition.plural, ?event, "no async runtime; lifecycle event ignored");
            }
        }
    }

    async fn call(&self, operation: Operation, payload: Value) -> Result<Value, StoreError> {
        let name = self
            .definition
            .operation(operation)
            .ok_or_else(|| StoreError::Unsupported {
                operation: operation.as_str(),
                object_type: self.definition.plural.clone(),
            })?;

        debug!(store = %self.definition.plural, operation = name, "remote call");
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.transport.emit(name, payload)).await {
            Err(_) => Err(StoreError::Transport(TransportError::Timeout {
                operation: name.to_string(),
                after: self.timeout,
            })),
            Ok(Err(err)) => Err(StoreError::Transport(err)),
            Ok(Ok(response)) => response.into_result(),
        };

        let outcome = match &result {
            Ok(_) => CallOutcome::Ok,
            Err(StoreError::Rejected(_)) => CallOutcome::Rejected,
            Err(_) => CallOutcome::Failed,
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_call(&self.definition.plural, name, outcome, started);
        }
        if let Err(err) = &result {
            warn!(store = %self.definition.plural, operation = name, error = %err, "remote call failed");
        }

        result
    }

    fn extract_one(&self, data: &Value) -> Result<Entity, StoreError> {
        data.get(&self.definition.singular)
            .cloned()
            .and_then(Entity::from_value)
            .ok_or_else(|| {
                TransportError::Malformed(format!("response has no valid {}", self.definition.singular)).into()
            })
    }

    fn extract_many(&self, data: &Value) -> Result<Vec<Entity>, StoreError> {
        let Some(Value::Array(items)) = data.get(&self.definition.plural) else {
            return Err(TransportError::Malformed(format!("response has no {} list", self.definition.plural)).into());
        };

        Ok(items
            .iter()
            .filter_map(|item| {
                let entity = Entity::from_value(item.clone());
                if entity.is_none() {
                    warn!(store = %self.definition.plural, "skipping {} without objectId", self.definition.singular);
                }
                entity
            })
            .collect())
    }

    /// Merge `update` into the cached entity, inserting it when unknown
    fn merge_in(&self, update: Entity) -> Entity {
        let merged = match self.objects.write().entry(entity_id(&update)) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().merge(&update);
                slot.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(update).clone(),
        };
        self.refresh_gauge();
        merged
    }

    fn mark_fetched(&self) {
        self.fetched.send_if_modified(|fetched| !std::mem::replace(fetched, true));
    }

    fn refresh_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            let len = self.objects.read().len();
            metrics
                .store_entities
                .with_label_values(&[self.definition.plural.as_str()])
                .set(len as i64);
        }
    }

    fn publish_change(&self, change_type: ChangeType, entity: Entity) {
        self.publish(self.definition.single_event(), &ChangeEvent { change_type, entity });
    }

    fn publish_error(&self, operation: Operation, params: Value, err: &StoreError) {
        let event = ErrorEvent {
            object_type: self.definition.plural.clone(),
            operation: self
                .definition
                .operation(operation)
                .unwrap_or(operation.as_str())
                .to_string(),
            params,
            message: err.to_string(),
            error: err.remote().cloned(),
        };
        self.publish(&self.error_event, &event);
    }

    fn publish<T: Serialize>(&self, event: &str, payload: &T) {
        if let Err(err) = self.bus.publish_typed(event, payload) {
            error!(store = %self.definition.plural, event, error = %err, "failed to publish");
        }
    }
}

/// Entities reach the map only through `Entity::from_value`, which
/// guarantees a string id.
fn entity_id(entity: &Entity) -> String {
    entity.id().unwrap_or_default().to_owned()
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("plural", &self.definition.plural)
            .field("len", &self.len())
            .field("has_fetched", &self.has_fetched())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::{MemoryTransport, RemoteResponse};
    use crate::core::error::{RemoteError, RemoteErrorKind};
    use crate::query::FilterRule;

    struct Harness {
        bus: EventBus,
        transport: Arc<MemoryTransport>,
        store: Arc<EntityStore>,
        single: Arc<Mutex<Vec<ChangeEvent>>>,
        many: Arc<Mutex<Vec<BulkChangeEvent>>>,
        errors: Arc<Mutex<Vec<ErrorEvent>>>,
        _subs: Vec<Subscription>,
    }

    fn harness(definition: StoreDefinition) -> Harness {
        let bus = EventBus::new();
        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(
            EntityStore::new(definition, bus.clone(), transport.clone()).with_timeout(Duration::from_secs(5)),
        );
        store.attach();

        let single = Arc::new(Mutex::new(Vec::new()));
        let many = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let subs = vec![
            {
                let single = single.clone();
                bus.subscribe(store.definition().single_event().to_string(), move |payload| {
                    single.lock().push(serde_json::from_value(payload.clone()).unwrap());
                })
            },
            {
                let many = many.clone();
                bus.subscribe(store.definition().many_event().to_string(), move |payload| {
                    many.lock().push(serde_json::from_value(payload.clone()).unwrap());
                })
            },
            {
                let errors = errors.clone();
                bus.subscribe(events::ERROR, move |payload| {
                    errors.lock().push(serde_json::from_value(payload.clone()).unwrap());
                })
            },
        ];

        Harness { bus, transport, store, single, many, errors, _subs: subs }
    }

    fn users() -> Harness {
        harness(StoreDefinition::conventional("user", "users"))
    }

    fn serve_users(transport: &MemoryTransport, users: Value) {
        transport.handle("getUsers", move |_| RemoteResponse::ok(json!({ "users": users.clone() })));
    }

    #[tokio::test]
    async fn retrieve_all_populates_and_publishes() {
        let h = users();
        serve_users(&h.transport, json!([{ "objectId": "u1", "username": "ann" }, { "objectId": "u2" }]));
        assert!(!h.store.has_fetched());

        let entities = h.store.retrieve_all(false).await.unwrap();

        assert_eq!(entities.len(), 2);
        assert!(h.store.has_fetched());
        assert_eq!(h.store.get_one("u1").unwrap().get_str("username"), Some("ann"));
        let many = h.many.lock();
        assert_eq!(many.len(), 1);
        assert!(!many[0].reset);
        assert_eq!(many[0].entities.len(), 2);
    }

    #[tokio::test]
    async fn retrieve_all_with_reset_drops_stale_entries() {
        let h = users();
        h.store.handle_push(&json!({ "changeType": "CREATE", "user": { "objectId": "stale" } }));
        serve_users(&h.transport, json!([{ "objectId": "u1" }]));

        h.store.retrieve_all(true).await.unwrap();

        assert_eq!(h.store.ids(), vec!["u1".to_string()]);
        assert!(h.many.lock()[0].reset);
    }

    #[tokio::test]
    async fn failed_retrieve_all_still_marks_fetched() {
        let h = users();
        h.transport.handle("getUsers", |_| RemoteResponse::err(RemoteError::new(RemoteErrorKind::NotAllowed)));

        let err = h.store.retrieve_all(false).await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(h.store.has_fetched());
        let errors = h.errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, "getUsers");
        assert_eq!(errors[0].object_type, "users");
        assert_eq!(errors[0].error.as_ref().map(|e| e.kind), Some(RemoteErrorKind::NotAllowed));
        assert!(h.many.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_retrieve_times_out_and_unblocks() {
        let h = users();

        let err = h.store.retrieve_all(false).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(h.store.has_fetched());
        assert_eq!(h.errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn store_without_retrieve_many_starts_fetched() {
        let h = harness(StoreDefinition::new("wallet", "wallets"));
        assert!(h.store.has_fetched());

        let err = h.store.retrieve_all(false).await.unwrap_err();
        assert!(matches!(err, StoreError::Unsupported { operation: "retrieveAll", .. }));
        assert!(h.errors.lock().is_empty());
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn update_merges_and_publishes_merged_entity() {
        let h = users();
        serve_users(&h.transport, json!([{ "objectId": "u1", "username": "ann", "accessLevel": 1 }]));
        h.transport.handle("updateUser", |params| {
            let level = params["user"]["accessLevel"].clone();
            RemoteResponse::ok(json!({ "user": { "objectId": "u1", "accessLevel": level } }))
        });
        h.store.retrieve_all(false).await.unwrap();

        let merged = h
            .store
            .update(json!({ "userId": "u1", "user": { "accessLevel": 4 } }))
            .await
            .unwrap();

        assert_eq!(merged.get("accessLevel"), Some(&json!(4)));
        assert_eq!(merged.get_str("username"), Some("ann"));
        let single = h.single.lock();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].change_type, ChangeType::Update);
        assert_eq!(single[0].entity, merged);
    }

    #[tokio::test]
    async fn rejected_mutation_leaves_cache_untouched() {
        let h = users();
        h.store.handle_push(&json!({ "changeType": "CREATE", "user": { "objectId": "u1", "username": "ann" } }));
        h.single.lock().clear();
        h.transport.handle("updateUser", |_| {
            RemoteResponse::err(RemoteError::with_param(RemoteErrorKind::InvalidLength, "username"))
        });

        let err = h
            .store
            .update(json!({ "userId": "u1", "user": { "username": "a" } }))
            .await
            .unwrap_err();

        assert_eq!(err.remote().and_then(RemoteError::param), Some("username"));
        assert_eq!(h.store.get_one("u1").unwrap().get_str("username"), Some("ann"));
        assert!(h.single.lock().is_empty());
        assert!(h.errors.lock().is_empty());
    }

    #[tokio::test]
    async fn unsupported_operations_fail_without_calling() {
        let h = harness(StoreDefinition::new("team", "teams").with_operation(Operation::RetrieveMany, "getTeams"));

        assert!(matches!(h.store.create(json!({})).await, Err(StoreError::Unsupported { operation: "create", .. })));
        assert!(matches!(h.store.update(json!({})).await, Err(StoreError::Unsupported { operation: "update", .. })));
        assert!(matches!(h.store.remove(json!({})).await, Err(StoreError::Unsupported { operation: "remove", .. })));
        assert!(h.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn create_inserts_and_remove_retires() {
        let h = users();
        h.transport.handle("createUser", |params| {
            RemoteResponse::ok(json!({ "user": { "objectId": "u9", "username": params["user"]["username"] } }))
        });
        h.transport.handle("removeUser", |_| RemoteResponse::ok(json!({})));

        let created = h.store.create(json!({ "user": { "username": "zed" } })).await.unwrap();
        assert_eq!(h.store.get_one("u9"), Some(created));

        let id = h.store.remove(json!({ "userId": "u9" })).await.unwrap();
        assert_eq!(id, "u9");
        assert_eq!(h.store.get_one("u9"), None);
        assert!(h.store.get_many(None, None).is_empty());

        let single = h.single.lock();
        assert_eq!(single[0].change_type, ChangeType::Create);
        assert_eq!(single[1].change_type, ChangeType::Remove);
        assert_eq!(single[1].entity, Entity::with_id("u9"));
    }

    #[tokio::test]
    async fn silent_retrieve_one_does_not_publish() {
        let h = users();
        h.transport.handle("getUser", |_| RemoteResponse::ok(json!({ "user": { "objectId": "u3", "code": "x" } })));

        let entity = h
            .store
            .retrieve_one(json!({ "code": "x" }), RetrieveOptions::silent())
            .await
            .unwrap();
        assert_eq!(entity.id(), Some("u3"));
        assert!(h.single.lock().is_empty());

        h.store.retrieve_one(json!({ "userId": "u3" }), RetrieveOptions::default()).await.unwrap();
        assert_eq!(h.single.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_retrieve_one_publishes_unless_silent() {
        let h = users();
        h.transport
            .handle("getUser", |_| RemoteResponse::err(RemoteError::new(RemoteErrorKind::DoesNotExist)));

        assert!(h.store.retrieve_one(json!({}), RetrieveOptions::silent()).await.is_err());
        assert!(h.errors.lock().is_empty());

        assert!(h.store.retrieve_one(json!({}), RetrieveOptions::default()).await.is_err());
        assert_eq!(h.errors.lock().len(), 1);
    }

    #[tokio::test]
    async fn malformed_response_is_a_transport_error() {
        let h = users();
        h.transport.handle("createUser", |_| RemoteResponse::ok(json!({ "room": {} })));

        let err = h.store.create(json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(TransportError::Malformed(_))));
        assert!(h.store.is_empty());
    }

    #[test]
    fn pushes_apply_in_order() {
        let h = users();
        let push = |data: Value| h.transport.push("user", data);

        push(json!({ "changeType": "CREATE", "user": { "objectId": "u1", "username": "ann" } }));
        push(json!({ "changeType": "UPDATE", "user": { "objectId": "u1", "accessLevel": 2 } }));
        push(json!({ "changeType": "UPDATE", "user": { "objectId": "u2", "username": "late" } }));

        let u1 = h.store.get_one("u1").unwrap();
        assert_eq!(u1.get_str("username"), Some("ann"));
        assert_eq!(u1.get("accessLevel"), Some(&json!(2)));
        assert!(h.store.get_one("u2").is_some());

        push(json!({ "changeType": "REMOVE", "user": { "objectId": "u1" } }));
        assert_eq!(h.store.get_one("u1"), None);

        let single = h.single.lock();
        assert_eq!(single.len(), 4);
        assert_eq!(single[3].entity, Entity::with_id("u1"));
    }

    #[test]
    fn repeated_update_push_is_idempotent() {
        let h = users();
        let update = json!({ "changeType": "UPDATE", "user": { "objectId": "u1", "accessLevel": 3 } });

        h.store.handle_push(&update);
        let once = h.store.get_many(None, None);
        h.store.handle_push(&update);

        assert_eq!(h.store.get_many(None, None), once);
    }

    #[test]
    fn unknown_change_type_is_dropped() {
        let h = users();
        h.store.handle_push(&json!({ "changeType": "UPSERT", "user": { "objectId": "u1" } }));
        h.store.handle_push(&json!({ "changeType": "CREATE" }));

        assert!(h.store.is_empty());
        assert!(h.single.lock().is_empty());
    }

    #[test]
    fn get_many_filters_and_sorts() {
        let h = users();
        for (id, name, team) in [("1", "carl", "t1"), ("2", "Ann", "t1"), ("3", "bob", "t2")] {
            h.store.handle_push(&json!({
                "changeType": "CREATE",
                "user": { "objectId": id, "username": name, "team": team }
            }));
        }

        let filter = Filter::all(vec![FilterRule::equals("team", "t1")]);
        let sorted = h.store.get_many(Some(&filter), Some(&Sorting::by("username")));

        let ids: Vec<_> = sorted.iter().filter_map(Entity::id).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn reset_clears_and_announces() {
        let h = users();
        h.store.handle_push(&json!({ "changeType": "CREATE", "user": { "objectId": "u1" } }));

        h.store.reset();

        assert!(h.store.is_empty());
        assert_eq!(h.many.lock().last().map(|e| e.reset), Some(true));
    }

    #[tokio::test]
    async fn lifecycle_events_trigger_retrieval() {
        let h = users();
        serve_users(&h.transport, json!([{ "objectId": "u1" }]));

        h.bus.publish(events::STARTUP, json!({}));
        h.store.ready().await;
        tokio::task::yield_now().await;

        assert_eq!(h.transport.call_count("getUsers"), 1);
        assert!(h.store.get_one("u1").is_some());
    }

    #[tokio::test]
    async fn reconnect_keeps_cache_while_login_resets() {
        let h = users();
        h.store.handle_push(&json!({ "changeType": "CREATE", "user": { "objectId": "local" } }));
        serve_users(&h.transport, json!([{ "objectId": "u1" }]));

        h.store.handle_lifecycle(LifecycleEvent::Reconnect).await;
        assert!(h.store.get_one("local").is_some());

        h.store.handle_lifecycle(LifecycleEvent::Login).await;
        assert!(h.store.get_one("local").is_none());
        assert!(h.store.get_one("u1").is_some());
    }

    #[tokio::test]
    async fn logout_resets_to_the_anonymous_view() {
        let h = users();
        serve_users(&h.transport, json!([{ "objectId": "u1" }, { "objectId": "private" }]));
        h.store.retrieve_all(false).await.unwrap();
        h.store.handle_push(&json!({ "changeType": "CREATE", "user": { "objectId": "local" } }));

        serve_users(&h.transport, json!([{ "objectId": "u1" }]));
        h.bus.publish(events::LOGOUT, json!({}));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut ids = h.store.ids();
        ids.sort();
        assert_eq!(ids, ["u1"]);
        assert_eq!(h.transport.call_count("getUsers"), 2);

        let many = h.many.lock();
        let last = many.last().unwrap();
        assert!(last.reset);
        assert_eq!(last.entities.len(), 1);
    }

    #[tokio::test]
    async fn metrics_track_calls_and_size() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let transport = Arc::new(MemoryTransport::new());
        serve_users(&transport, json!([{ "objectId": "u1" }, { "objectId": "u2" }]));
        let store = EntityStore::new(StoreDefinition::conventional("user", "users"), EventBus::new(), transport)
            .with_metrics(metrics.clone());

        store.retrieve_all(false).await.unwrap();

        assert_eq!(
            metrics.remote_calls.with_label_values(&["users", "getUsers", "ok"]).get(),
            1
        );
        assert_eq!(metrics.store_entities.with_label_values(&["users"]).get(), 2);
    }
}
