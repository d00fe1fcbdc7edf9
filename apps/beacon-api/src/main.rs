use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use beacon_api::auth::principal::Principal;
use beacon_api::broadcast::authorizer::{Access, ChannelAuthorizer};
use beacon_api::broadcast::drivers::{LogBroadcaster, NullBroadcaster, PollBroadcaster, RedisBroadcaster};
use beacon_api::broadcast::error::BroadcastError;
use beacon_api::broadcast::manager::{BroadcastManager, ConnectionConfig};
use beacon_api::broadcast::presence::PresenceRegistry;
use beacon_api::broadcast::store::MemoryEventStore;
use beacon_api::config::Config;
use beacon_api::db::kv::{KeyValueStore, MemoryStore, RedisStore};
use beacon_api::queue::{self, LockStore, MemoryLockStore, MemoryQueue, RedisLockStore};
use beacon_api::routes::ApiDoc;
use beacon_api::AppState;
use beacon_common::CursorGenerator;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let kv: Arc<dyn KeyValueStore> = match config.kv_driver.as_str() {
        "redis" => Arc::new(
            RedisStore::connect(&config.redis_url)
                .await
                .expect("redis kv store"),
        ),
        _ => Arc::new(MemoryStore::new()),
    };

    let locks: Arc<dyn LockStore> = match config.kv_driver.as_str() {
        "redis" => Arc::new(RedisLockStore::new(&config.redis_url).expect("redis lock store")),
        _ => Arc::new(MemoryLockStore::new()),
    };

    let mut authorizer = ChannelAuthorizer::new();
    register_channels(&mut authorizer);
    let authorizer = Arc::new(authorizer);

    let store = Arc::new(MemoryEventStore::new(config.poll_max_per_channel));
    let presence = Arc::new(PresenceRegistry::new());
    let cursors = Arc::new(CursorGenerator::new(0));

    let (job_queue, job_rx) = MemoryQueue::new();

    let mut connections = HashMap::new();
    connections.insert("poll".to_string(), ConnectionConfig::new("poll"));
    connections.insert(
        "redis".to_string(),
        ConnectionConfig::new("redis")
            .option("url", config.redis_url.as_str())
            .option("prefix", config.redis_channel_prefix.as_str()),
    );
    connections.insert("log".to_string(), ConnectionConfig::new("log"));
    connections.insert("null".to_string(), ConnectionConfig::new("null"));

    let manager = BroadcastManager::new(
        config.default_connection.clone(),
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
        manager.register_driver("redis", move |cfg| {
            let url = cfg
                .options
                .get("url")
                .ok_or_else(|| BroadcastError::Configuration("redis url missing".to_string()))?;
            let prefix = cfg.options.get("prefix").cloned().unwrap_or_default();
            Ok(Arc::new(RedisBroadcaster::new(url, prefix, authorizer.clone())?))
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

    // Fail fast on a misconfigured default connection.
    manager
        .connection(None)
        .expect("default broadcast connection");

    queue::spawn_worker(job_rx, manager.clone(), locks.clone());
    spawn_sweeper(
        store.clone(),
        presence.clone(),
        Duration::from_secs(config.poll_retention_secs),
        Duration::from_secs(config.presence_ttl_secs),
    );

    tracing::info!(
        default_connection = %config.default_connection,
        kv_driver = %config.kv_driver,
        "beacon-api configured"
    );

    let state = AppState {
        config: Arc::new(config),
        kv,
        manager,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(beacon_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "beacon-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}

/// Channel guards for this deployment.
///
/// `user.{id}`: a principal may subscribe to their own private channel.
/// `room.{room}`: any authenticated principal may join; presence exposes
/// id + name.
fn register_channels(authorizer: &mut ChannelAuthorizer) {
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
}

/// Periodically evict expired poll records and stale presence members.
fn spawn_sweeper(
    store: Arc<MemoryEventStore>,
    presence: Arc<PresenceRegistry>,
    retention: Duration,
    presence_ttl: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let expired_events = store.sweep_expired(retention);
            let expired_members = presence.sweep_expired(presence_ttl);
            if expired_events > 0 || expired_members > 0 {
                tracing::debug!(expired_events, expired_members, "sweeper pass");
            }
        }
    });
}
