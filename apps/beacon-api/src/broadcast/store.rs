//! Append-only per-channel event log backing the poll transport.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use utoipa::ToSchema;

use crate::broadcast::error::BroadcastError;

/// One broadcast persisted for later retrieval by polling clients.
///
/// `id` is a process-monotonic cursor: within a channel, append order equals
/// id order, which is what makes "everything after X" queries meaningful.
/// Records are never mutated after append.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PersistedBroadcastRecord {
    /// Cursor id, serialized as an opaque string.
    #[serde(serialize_with = "id_as_string")]
    #[schema(value_type = String)]
    pub id: i64,
    /// Wire channel name the event was broadcast on.
    pub channel: String,
    /// Wire event name.
    pub event: String,
    #[schema(value_type = Object)]
    pub payload: Value,
    /// Sender's socket id when the sender excluded itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn id_as_string<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

/// Durable store contract consumed by the poll broadcaster.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, record: PersistedBroadcastRecord) -> Result<(), BroadcastError>;

    /// Events on any of `channels` with id strictly greater than `after`,
    /// ordered by id ascending.
    async fn since(
        &self,
        channels: &[String],
        after: Option<i64>,
    ) -> Result<Vec<PersistedBroadcastRecord>, BroadcastError>;
}

/// In-memory event store with per-channel size cap and TTL-based retention.
///
/// Backed by a real datastore in multi-process deployments; this
/// implementation serves single-process deployments and tests.
pub struct MemoryEventStore {
    channels: DashMap<String, VecDeque<PersistedBroadcastRecord>>,
    max_per_channel: usize,
}

impl MemoryEventStore {
    pub fn new(max_per_channel: usize) -> Self {
        Self {
            channels: DashMap::new(),
            max_per_channel,
        }
    }

    /// Drop records older than `retention`; returns how many were removed.
    /// Channels left empty are removed entirely.
    pub fn sweep_expired(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        let mut removed = 0;

        self.channels.retain(|_, records| {
            while records
                .front()
                .is_some_and(|record| record.created_at < cutoff)
            {
                records.pop_front();
                removed += 1;
            }
            !records.is_empty()
        });

        removed
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(&self, record: PersistedBroadcastRecord) -> Result<(), BroadcastError> {
        let mut records = self.channels.entry(record.channel.clone()).or_default();
        records.push_back(record);
        while records.len() > self.max_per_channel {
            records.pop_front();
        }
        Ok(())
    }

    async fn since(
        &self,
        channels: &[String],
        after: Option<i64>,
    ) -> Result<Vec<PersistedBroadcastRecord>, BroadcastError> {
        let after = after.unwrap_or(i64::MIN);
        let mut events = Vec::new();

        for channel in channels {
            if let Some(records) = self.channels.get(channel) {
                events.extend(
                    records
                        .iter()
                        .filter(|record| record.id > after)
                        .cloned(),
                );
            }
        }

        events.sort_by_key(|record| record.id);
        Ok(events)
    }
}
