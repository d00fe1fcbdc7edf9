//! Driver registry and the single entry point for dispatching broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use dashmap::DashMap;

use crate::broadcast::broadcaster::Broadcaster;
use crate::broadcast::channel::Channel;
use crate::broadcast::envelope::{AnonymousEvent, BroadcastEnvelope, Broadcastable};
use crate::broadcast::error::BroadcastError;
use crate::broadcast::job::DeliveryJob;
use crate::broadcast::pending::PendingBroadcast;
use crate::queue::{JobQueue, LockStore};

/// Request header carrying the sender's live connection id.
pub const SOCKET_ID_HEADER: &str = "x-socket-id";

/// A named broadcaster connection: which driver to build it with, plus
/// driver-specific options.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    pub driver: String,
    pub options: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            options: HashMap::new(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

type DriverFactory =
    Box<dyn Fn(&ConnectionConfig) -> Result<Arc<dyn Broadcaster>, BroadcastError> + Send + Sync>;

/// Resolves named connections to broadcaster instances and routes outgoing
/// broadcasts to the queue.
///
/// Resolved backends are memoized per connection name for the process
/// lifetime. Two requests racing the first resolution of the same name may
/// construct the backend twice; construction is cheap configuration binding,
/// so the second instance simply wins the cache slot.
pub struct BroadcastManager {
    default_connection: String,
    connections: HashMap<String, ConnectionConfig>,
    factories: DashMap<String, DriverFactory>,
    resolved: DashMap<String, Arc<dyn Broadcaster>>,
    queue: Arc<dyn JobQueue>,
    locks: Arc<dyn LockStore>,
}

impl BroadcastManager {
    pub fn new(
        default_connection: impl Into<String>,
        connections: HashMap<String, ConnectionConfig>,
        queue: Arc<dyn JobQueue>,
        locks: Arc<dyn LockStore>,
    ) -> Self {
        Self {
            default_connection: default_connection.into(),
            connections,
            factories: DashMap::new(),
            resolved: DashMap::new(),
            queue,
            locks,
        }
    }

    /// Register a driver factory under `name`. Built-in drivers are
    /// registered at startup; applications may add their own.
    pub fn register_driver<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ConnectionConfig) -> Result<Arc<dyn Broadcaster>, BroadcastError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Resolve a named connection (the default when `None`) to its backend.
    ///
    /// Unknown names are configuration errors: fatal, surfaced immediately,
    /// never retried.
    pub fn connection(&self, name: Option<&str>) -> Result<Arc<dyn Broadcaster>, BroadcastError> {
        let name = name.unwrap_or(&self.default_connection);

        if let Some(resolved) = self.resolved.get(name) {
            return Ok(resolved.clone());
        }

        let config = self
            .connections
            .get(name)
            .ok_or_else(|| BroadcastError::UnknownConnection(name.to_string()))?;
        let factory = self
            .factories
            .get(&config.driver)
            .ok_or_else(|| BroadcastError::UnknownDriver(config.driver.clone()))?;

        let backend = (factory.value())(config)?;
        self.resolved.insert(name.to_string(), backend.clone());
        Ok(backend)
    }

    /// Wrap an event in a scoped broadcast that fires when dropped.
    pub fn event(self: &Arc<Self>, event: &dyn Broadcastable) -> PendingBroadcast {
        PendingBroadcast::new(self.clone(), BroadcastEnvelope::from_event(event))
    }

    /// Start a fluent ad hoc broadcast on `channel`.
    pub fn on(self: &Arc<Self>, channel: Channel) -> AnonymousEvent {
        AnonymousEvent::new(self.clone(), channel)
    }

    /// Snapshot `event` and hand it to the queue (or deliver inline when the
    /// event demands immediate dispatch).
    pub async fn queue(&self, event: &dyn Broadcastable) -> Result<(), BroadcastError> {
        self.queue_envelope(BroadcastEnvelope::from_event(event)).await
    }

    /// Queue an already-built envelope.
    ///
    /// When the envelope declares uniqueness, the lock is acquired here, at
    /// enqueue time; a held lock means a logically-identical broadcast is
    /// already in flight and this one is silently dropped.
    pub async fn queue_envelope(&self, envelope: BroadcastEnvelope) -> Result<(), BroadcastError> {
        if envelope.immediate {
            return DeliveryJob::new(envelope, None).handle(self).await;
        }

        let unique_key = match &envelope.uniqueness {
            Some(uniqueness) => {
                let key = format!(
                    "broadcast:unique:{}",
                    uniqueness.key.as_deref().unwrap_or(&envelope.event)
                );
                if !self.locks.try_acquire(&key, uniqueness.ttl_secs).await? {
                    tracing::debug!(key = %key, event = %envelope.event, "duplicate broadcast dropped");
                    return Ok(());
                }
                Some(key)
            }
            None => None,
        };

        self.queue.enqueue(DeliveryJob::new(envelope, unique_key));
        Ok(())
    }

    /// Extract the sender's socket id from the `X-Socket-ID` request header.
    pub fn socket_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(SOCKET_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::broadcast::broadcaster::{AuthDecision, AuthRequest, JsonMap};
    use crate::queue::{MemoryLockStore, MemoryQueue};

    struct CountingBroadcaster;

    #[async_trait]
    impl Broadcaster for CountingBroadcaster {
        async fn broadcast(
            &self,
            _channels: &[Channel],
            _event: &str,
            _payload: JsonMap,
        ) -> Result<(), BroadcastError> {
            Ok(())
        }

        async fn authorize(&self, _request: &AuthRequest) -> AuthDecision {
            AuthDecision::Deny
        }
    }

    fn test_manager(connections: HashMap<String, ConnectionConfig>) -> BroadcastManager {
        let (queue, _rx) = MemoryQueue::new();
        BroadcastManager::new(
            "main",
            connections,
            Arc::new(queue),
            Arc::new(MemoryLockStore::new()),
        )
    }

    #[test]
    fn unknown_connection_is_a_configuration_error() {
        let manager = test_manager(HashMap::new());
        let err = manager.connection(Some("nope")).unwrap_err();
        assert!(matches!(err, BroadcastError::UnknownConnection(name) if name == "nope"));
    }

    #[test]
    fn unknown_driver_is_a_configuration_error() {
        let mut connections = HashMap::new();
        connections.insert("main".to_string(), ConnectionConfig::new("missing"));

        let manager = test_manager(connections);
        let err = manager.connection(None).unwrap_err();
        assert!(matches!(err, BroadcastError::UnknownDriver(name) if name == "missing"));
    }

    #[test]
    fn resolution_is_memoized_per_connection_name() {
        let mut connections = HashMap::new();
        connections.insert("main".to_string(), ConnectionConfig::new("counting"));

        let manager = test_manager(connections);
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        manager.register_driver("counting", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingBroadcaster))
        });

        manager.connection(None).unwrap();
        manager.connection(None).unwrap();
        manager.connection(Some("main")).unwrap();

        assert_eq!(constructed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_drivers_extend_the_registry() {
        let mut connections = HashMap::new();
        connections.insert("custom".to_string(), ConnectionConfig::new("mine"));

        let manager = test_manager(connections);
        manager.register_driver("mine", |_| Ok(Arc::new(CountingBroadcaster)));

        assert!(manager.connection(Some("custom")).is_ok());
    }

    #[test]
    fn socket_id_reads_the_header() {
        let manager = test_manager(HashMap::new());

        let mut headers = HeaderMap::new();
        assert_eq!(manager.socket_id(&headers), None);

        headers.insert(SOCKET_ID_HEADER, "sock_abc".parse().unwrap());
        assert_eq!(manager.socket_id(&headers), Some("sock_abc".to_string()));
    }
}
