use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;

use beacon_api::auth::principal::Principal;
use beacon_api::auth::session;
use beacon_api::broadcast::authorizer::{Access, ChannelAuthorizer};
use beacon_api::broadcast::drivers::{LogBroadcaster, NullBroadcaster, PollBroadcaster};
use beacon_api::broadcast::manager::{BroadcastManager, ConnectionConfig};
use beacon_api::broadcast::presence::PresenceRegistry;
use beacon_api::broadcast::store::{EventStore, MemoryEventStore};
use beacon_api::config::Config;
use beacon_api::db::kv::{KeyValueStore, MemoryStore};
use beacon_api::queue::{self, LockStore, MemoryLockStore, MemoryQueue};
use beacon_api::AppState;
use beacon_common::CursorGenerator;

/// Everything a test needs to drive the service and inspect its internals.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryEventStore>,
    pub presence: Arc<PresenceRegistry>,
    pub locks: Arc<dyn LockStore>,
}

/// Channel guards used across the test suite:
/// - `orders.{id}`: any authenticated principal.
/// - `user.{id}`: only the matching principal.
/// - `room.{room}`: presence; member info is id + name.
/// - `secret.{id}`: always denied.
pub fn register_test_channels(authorizer: &mut ChannelAuthorizer) {
    authorizer.guard("orders.{id}", |_, _| Access::Granted);

    authorizer.guard("user.{id}", |principal: &Principal, params| {
        if params.get("id") == Some(principal.id.as_str()) {
            Access::Granted
        } else {
            Access::Denied
        }
    });

    authorizer.guard("room.{room}", |principal: &Principal, _| {
        Access::Member(serde_json::json!({
            "id": principal.id,
            "name": principal.name,
        }))
    });

    authorizer.guard("secret.{id}", |_, _| Access::Denied);
}

/// Build a test AppState with in-memory stores and a running queue worker.
pub async fn test_state_with_default(default_connection: &str) -> TestContext {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let locks: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());

    let mut authorizer = ChannelAuthorizer::new();
    register_test_channels(&mut authorizer);
    let authorizer = Arc::new(authorizer);

    let store = Arc::new(MemoryEventStore::new(1000));
    let presence = Arc::new(PresenceRegistry::new());
    let cursors = Arc::new(CursorGenerator::new(0));

    let (job_queue, job_rx) = MemoryQueue::new();

    let mut connections = HashMap::new();
    connections.insert("poll".to_string(), ConnectionConfig::new("poll"));
    connections.insert("log".to_string(), ConnectionConfig::new("log"));
    connections.insert("null".to_string(), ConnectionConfig::new("null"));

    let manager = BroadcastManager::new(
        default_connection,
        connections,
        Arc::new(job_queue),
        locks.clone(),
    );

    {
        let store = store.clone();
        let presence = presence.clone();
        let authorizer = authorizer.clone();
        let cursors = cursors.clone();
        manager.register_driver("poll", move |_| {
            Ok(Arc::new(PollBroadcaster::new(
                store.clone(),
                presence.clone(),
                authorizer.clone(),
                cursors.clone(),
            )))
        });
    }
    {
        let authorizer = authorizer.clone();
        manager.register_driver("log", move |_| {
            Ok(Arc::new(LogBroadcaster::new(authorizer.clone())))
        });
    }
    {
        let authorizer = authorizer.clone();
        manager.register_driver("null", move |_| {
            Ok(Arc::new(NullBroadcaster::new(authorizer.clone())))
        });
    }

    let manager = Arc::new(manager);
    queue::spawn_worker(job_rx, manager.clone(), locks.clone());

    let config = Config {
        port: 0,
        default_connection: default_connection.to_string(),
        redis_url: "redis://localhost:6379/0".to_string(),
        kv_driver: "memory".to_string(),
        redis_channel_prefix: "beacon:".to_string(),
        poll_retention_secs: 600,
        poll_max_per_channel: 1000,
        presence_ttl_secs: 60,
    };

    TestContext {
        state: AppState {
            config: Arc::new(config),
            kv,
            manager,
        },
        store,
        presence,
        locks,
    }
}

pub async fn test_state() -> TestContext {
    test_state_with_default("poll").await
}

/// Build the full application router wired to the test state.
pub fn test_server(ctx: &TestContext) -> TestServer {
    let app = beacon_api::routes::router().with_state(ctx.state.clone());
    TestServer::new(app).unwrap()
}

/// Create a session for a test principal and return its bearer token.
pub async fn login(ctx: &TestContext, id: &str, name: &str) -> String {
    let token = session::generate_session_token();
    session::store_session(ctx.state.kv.as_ref(), &token, &Principal::new(id, name))
        .await
        .expect("store session");
    token
}

/// Wait until the queue worker has persisted at least `count` events on the
/// given wire channels.
pub async fn wait_for_events(ctx: &TestContext, channels: &[&str], count: usize) {
    let channels: Vec<String> = channels.iter().map(|s| s.to_string()).collect();
    for _ in 0..200 {
        let events = ctx.store.since(&channels, None).await.expect("store read");
        if events.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {count} events on {channels:?}");
}

/// Give the worker a moment to drain anything still in flight.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
