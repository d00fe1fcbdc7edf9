//! Job queue and lock-store collaborators for asynchronous delivery.
//!
//! The dispatch core only depends on the traits here. The in-memory
//! implementations serve single-process deployments and tests; the Redis
//! lock store covers multi-process workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::error::BroadcastError;
use crate::broadcast::job::DeliveryJob;
use crate::broadcast::manager::BroadcastManager;

// ---------------------------------------------------------------------------
// Job queue
// ---------------------------------------------------------------------------

/// Hand-off point for asynchronous broadcast delivery.
///
/// `enqueue` is synchronous and non-blocking: the caller performs no
/// transport I/O. Retry and dead-letter policy live behind this interface,
/// not in the dispatch core.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: DeliveryJob);
}

/// Unbounded in-process queue drained by [`spawn_worker`].
pub struct MemoryQueue {
    tx: mpsc::UnboundedSender<DeliveryJob>,
}

impl MemoryQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveryJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl JobQueue for MemoryQueue {
    fn enqueue(&self, job: DeliveryJob) {
        // send() only fails when the worker is gone; the job is dropped then.
        if self.tx.send(job).is_err() {
            tracing::warn!("job queue closed; broadcast dropped");
        }
    }
}

/// Drain delivery jobs until the queue closes.
///
/// Failed deliveries are logged and left to the queue's retry policy; the
/// uniqueness lock (if any) is released once the attempt finishes.
pub fn spawn_worker(
    mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
    manager: Arc<BroadcastManager>,
    locks: Arc<dyn LockStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match job.handle(&manager).await {
                Ok(()) => {
                    tracing::debug!(job_id = %job.id, event = %job.envelope.event, "broadcast delivered");
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, event = %job.envelope.event, error = %e, "broadcast delivery failed");
                }
            }

            if let Some(key) = &job.unique_key {
                if let Err(e) = locks.release(key).await {
                    tracing::warn!(key = %key, error = %e, "failed to release uniqueness lock");
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Lock store
// ---------------------------------------------------------------------------

/// Shared lock store backing broadcast uniqueness.
///
/// Workers run in separate processes, so in-process locking is not assumed:
/// production uses the Redis implementation.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Acquire `key` for `ttl_secs`. Returns false if it is already held.
    async fn try_acquire(&self, key: &str, ttl_secs: u64) -> Result<bool, BroadcastError>;

    async fn release(&self, key: &str) -> Result<(), BroadcastError>;
}

/// Expiring in-memory lock map.
pub struct MemoryLockStore {
    held: Mutex<HashMap<String, Instant>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, ttl_secs: u64) -> Result<bool, BroadcastError> {
        let mut held = self.held.lock();
        let now = Instant::now();

        if held.get(key).is_some_and(|expiry| *expiry > now) {
            return Ok(false);
        }

        held.insert(key.to_string(), now + Duration::from_secs(ttl_secs));
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), BroadcastError> {
        self.held.lock().remove(key);
        Ok(())
    }
}

/// Redis-backed lock store (`SET key 1 NX EX ttl`).
pub struct RedisLockStore {
    client: redis::Client,
    conn: tokio::sync::OnceCell<redis::aio::ConnectionManager>,
}

impl RedisLockStore {
    pub fn new(url: &str) -> Result<Self, BroadcastError> {
        let client = redis::Client::open(url)
            .map_err(|e| BroadcastError::Configuration(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: tokio::sync::OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<redis::aio::ConnectionManager, BroadcastError> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_connection_manager())
            .await
            .map_err(|e| BroadcastError::Transport(e.to_string()))?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(&self, key: &str, ttl_secs: u64) -> Result<bool, BroadcastError> {
        use redis::{AsyncCommands, ExistenceCheck, SetExpiry, SetOptions};

        let mut conn = self.connection().await?;
        let options = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(ttl_secs));
        let reply: Option<String> = conn
            .set_options(key, "1", options)
            .await
            .map_err(|e| BroadcastError::Transport(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), BroadcastError> {
        use redis::AsyncCommands;

        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| BroadcastError::Transport(e.to_string()))
    }
}
