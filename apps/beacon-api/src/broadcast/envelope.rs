//! The broadcast envelope and the contracts event types implement.

use std::sync::Arc;

use serde_json::Value;

use crate::broadcast::broadcaster::JsonMap;
use crate::broadcast::channel::Channel;
use crate::broadcast::error::BroadcastError;
use crate::broadcast::manager::BroadcastManager;

/// Deduplication settings for a broadcast.
///
/// `key` defaults to the event name; at most one delivery for a given key is
/// in flight within `ttl_secs`.
#[derive(Debug, Clone)]
pub struct Uniqueness {
    pub key: Option<String>,
    pub ttl_secs: u64,
}

impl Uniqueness {
    pub fn for_secs(ttl_secs: u64) -> Self {
        Self {
            key: None,
            ttl_secs,
        }
    }

    pub fn keyed(key: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            key: Some(key.into()),
            ttl_secs,
        }
    }
}

/// Everything needed to deliver one broadcast.
///
/// An envelope is a frozen snapshot: `BroadcastManager::queue` clones the
/// source event's data into it, so mutating the original event after queuing
/// cannot alter what the worker delivers.
#[derive(Debug, Clone)]
pub struct BroadcastEnvelope {
    pub channels: Vec<Channel>,
    pub event: String,
    pub payload: JsonMap,
    /// Named broadcaster connection override; `None` uses the default.
    pub connection: Option<String>,
    /// Queue name hint for the job queue.
    pub queue: Option<String>,
    /// The sender's live connection id, for "don't echo back to me".
    pub socket_id: Option<String>,
    /// When false and `socket_id` is set, delivery excludes the sender.
    pub include_sender: bool,
    /// Bypass the queue and deliver inline.
    pub immediate: bool,
    pub uniqueness: Option<Uniqueness>,
}

impl BroadcastEnvelope {
    pub fn new(channels: Vec<Channel>, event: impl Into<String>) -> Self {
        Self {
            channels,
            event: event.into(),
            payload: JsonMap::new(),
            connection: None,
            queue: None,
            socket_id: None,
            include_sender: true,
            immediate: false,
            uniqueness: None,
        }
    }

    /// Snapshot a `Broadcastable` event into an envelope.
    pub fn from_event(event: &dyn Broadcastable) -> Self {
        Self {
            channels: event.channels(),
            event: event.event_name(),
            payload: event.to_broadcast_payload(),
            connection: event.broadcast_connection(),
            queue: event.broadcast_queue(),
            socket_id: None,
            include_sender: true,
            immediate: event.broadcast_now(),
            uniqueness: event.uniqueness(),
        }
    }
}

/// Contract for application event types that broadcast.
///
/// `to_broadcast_payload` is the explicit serialization point — there is no
/// field reflection. The remaining methods are optional capabilities with
/// defaults: override `broadcast_connection` to pin a connection,
/// `broadcast_queue` to pick a queue, `broadcast_now` to skip the queue, and
/// `uniqueness` to deduplicate bursts of identical events.
pub trait Broadcastable {
    fn event_name(&self) -> String;

    fn channels(&self) -> Vec<Channel>;

    fn to_broadcast_payload(&self) -> JsonMap;

    fn broadcast_connection(&self) -> Option<String> {
        None
    }

    fn broadcast_queue(&self) -> Option<String> {
        None
    }

    fn broadcast_now(&self) -> bool {
        false
    }

    fn uniqueness(&self) -> Option<Uniqueness> {
        None
    }
}

/// One-shot fluent builder for broadcasting without declaring an event type.
///
/// ```ignore
/// manager
///     .on(Channel::private("orders.42"))
///     .as_event("OrderShipped")
///     .with_field("orderId", 42)
///     .send()
///     .await?;
/// ```
pub struct AnonymousEvent {
    manager: Arc<BroadcastManager>,
    envelope: BroadcastEnvelope,
}

impl AnonymousEvent {
    pub(crate) fn new(manager: Arc<BroadcastManager>, channel: Channel) -> Self {
        Self {
            manager,
            envelope: BroadcastEnvelope::new(vec![channel], "AnonymousEvent"),
        }
    }

    /// Add another target channel.
    pub fn channel(mut self, channel: Channel) -> Self {
        self.envelope.channels.push(channel);
        self
    }

    /// Override the wire event name.
    pub fn as_event(mut self, name: impl Into<String>) -> Self {
        self.envelope.event = name.into();
        self
    }

    /// Replace the payload wholesale.
    pub fn with(mut self, payload: JsonMap) -> Self {
        self.envelope.payload = payload;
        self
    }

    /// Set a single payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.envelope.payload.insert(key.into(), value.into());
        self
    }

    /// Route through a named broadcaster connection.
    pub fn via(mut self, connection: impl Into<String>) -> Self {
        self.envelope.connection = Some(connection.into());
        self
    }

    /// Exclude the sender's own connection from delivery.
    pub fn to_others(mut self, socket_id: impl Into<String>) -> Self {
        self.envelope.socket_id = Some(socket_id.into());
        self.envelope.include_sender = false;
        self
    }

    /// Hand the broadcast to the queue.
    pub async fn send(self) -> Result<(), BroadcastError> {
        self.manager.queue_envelope(self.envelope).await
    }

    /// Deliver inline, bypassing the queue.
    pub async fn send_now(mut self) -> Result<(), BroadcastError> {
        self.envelope.immediate = true;
        self.manager.queue_envelope(self.envelope).await
    }
}
