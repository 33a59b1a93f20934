//! Entity Sync demo harness
//!
//! Boots an AppState over an in-process authority, waits until every store
//! has fetched, then prints per-store counts and the collected metrics.

use anyhow::Context;
use clap::Parser;
use entity_sync::comms::{MemoryTransport, RemoteResponse};
use entity_sync::core::{config::Config, create_app_state, logging::init_logging};
use entity_sync::storage::StoreDefinition;
use entity_sync::sync::IdentityComposer;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "entity-sync", version = entity_sync::VERSION, about = "Client-side entity sync core demo.")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Number of demo users the in-process authority serves
    #[arg(long, value_name = "N", default_value_t = 3)]
    seed: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    // Apply CLI overrides
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if config.stores.is_empty() {
        config.stores = demo_stores();
    }

    init_logging(&config.logging);
    info!("Starting {} v{}", entity_sync::NAME, entity_sync::VERSION);

    let transport = Arc::new(MemoryTransport::new());
    seed_authority(&transport, &config, cli.seed);

    let wait_limit = config.sync.request_timeout * 2;
    let state = create_app_state(config, transport.clone())?;

    let composer = match (state.store("users"), state.store("aliases")) {
        (Some(users), Some(aliases)) => Some(IdentityComposer::new(state.bus.clone(), users, aliases)),
        _ => None,
    };

    let gate = state.gate_all(Some("allStoresReady".to_string()));
    let waiting = gate.spawn();

    state.start();
    tokio::time::timeout(wait_limit, waiting)
        .await
        .context("stores did not become ready in time")?
        .context("readiness task failed")?;

    for store in state.stores() {
        println!("{:<12} {:>6}", store.name(), store.len());
    }

    if let Some(composer) = composer {
        composer.ready().await;
        if let Some(name) = composer.display_name("alias-0") {
            println!("alias-0 resolves to {}", name);
        }
    }

    // Simulate a server push for the first configured store
    if let Some(store) = state.stores().first() {
        let definition = store.definition();
        let pushed = json!({
            "changeType": "CREATE",
            definition.singular.as_str(): { "objectId": format!("{}-pushed", definition.singular) },
        });
        let delivered = definition
            .push_events
            .iter()
            .map(|event| transport.push(event, pushed.clone()))
            .sum::<usize>();
        if delivered == 0 {
            warn!("Store {} has no push listeners", store.name());
        }
        println!("{} after push: {}", store.name(), store.len());

        if definition.create.is_some() {
            let params = json!({ definition.singular.as_str(): { "name": "created by harness" } });
            match store.create(params).await {
                Ok(entity) => println!("created {}", entity.id().unwrap_or("-")),
                Err(err) => warn!("Create on {} failed: {}", store.name(), err),
            }
        }
    }

    if let Some(metrics) = &state.metrics {
        print!("{}", metrics.gather_text()?);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Stores used when the configuration names none
fn demo_stores() -> Vec<StoreDefinition> {
    vec![
        StoreDefinition::conventional("user", "users"),
        StoreDefinition::conventional("alias", "aliases"),
        StoreDefinition::conventional("room", "rooms"),
    ]
}

/// Answer every configured retrieve-many operation with generated entities.
/// Creations are echoed back with a fresh id.
fn seed_authority(transport: &MemoryTransport, config: &Config, seed: usize) {
    for definition in &config.stores {
        if let Some(operation) = definition.retrieve_many.clone() {
            let entities: Vec<Value> = (0..seed)
                .map(|i| demo_entity(&definition.singular, i))
                .collect();
            let body = json!({ definition.plural.as_str(): entities });
            transport.handle(operation, move |_| RemoteResponse::ok(body.clone()));
        }

        if let Some(operation) = definition.create.clone() {
            let singular = definition.singular.clone();
            transport.handle(operation, move |params| {
                let mut entity = params.get(&singular).cloned().unwrap_or_else(|| json!({}));
                if let Some(fields) = entity.as_object_mut() {
                    fields.insert("objectId".into(), json!(Uuid::new_v4().to_string()));
                }
                RemoteResponse::ok(json!({ singular.as_str(): entity }))
            });
        }
    }
}

fn demo_entity(singular: &str, index: usize) -> Value {
    let id = format!("{}-{}", singular, index);
    match singular {
        "user" => json!({ "objectId": id, "username": format!("user{}", index), "accessLevel": 1 }),
        "alias" => json!({ "objectId": id, "aliasName": format!("alias{}", index), "ownerId": format!("user-{}", index) }),
        _ => json!({ "objectId": id, "isPublic": true, "visibility": 0 }),
    }
}
