//! The backend capability contract every broadcast driver implements.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::principal::Principal;
use crate::broadcast::channel::Channel;
use crate::broadcast::error::BroadcastError;
use crate::broadcast::presence::PresenceMember;
use crate::broadcast::store::PersistedBroadcastRecord;

/// JSON object payload attached to a broadcast.
pub type JsonMap = Map<String, Value>;

/// An inbound channel authorization request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub channel: Channel,
    pub principal: Option<Principal>,
    pub socket_id: Option<String>,
}

/// Outcome of a channel authorization check.
///
/// Denial is an explicit negative result, not an error. `member` is only
/// populated for presence channels.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    Allow { member: Option<Value> },
    Deny,
}

/// Abstraction over a broadcast delivery backend.
///
/// `broadcast` publishes or persists one event on every listed channel;
/// channels with zero subscribers are not an error. Transport failures
/// propagate to the caller (the queue job), which owns retry policy.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(
        &self,
        channels: &[Channel],
        event: &str,
        payload: JsonMap,
    ) -> Result<(), BroadcastError>;

    async fn authorize(&self, request: &AuthRequest) -> AuthDecision;

    /// Capability hook: backends that can serve cursor-based polling return
    /// themselves here. Everything else stays `None`.
    fn as_pollable(&self) -> Option<&dyn Pollable> {
        None
    }
}

impl std::fmt::Debug for dyn Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Broadcaster")
    }
}

/// Events returned from a poll, plus the cursor for the next request.
#[derive(Debug)]
pub struct EventBatch {
    pub events: Vec<PersistedBroadcastRecord>,
    pub last_event_id: i64,
}

/// Extended capability for pull-based transports.
#[async_trait]
pub trait Pollable: Send + Sync {
    /// All events on `channels` strictly after `after`, in cursor order.
    async fn events_since(
        &self,
        channels: &[String],
        after: Option<i64>,
    ) -> Result<EventBatch, BroadcastError>;

    /// Refresh `member`'s presence on `channel` and return the current
    /// member list.
    async fn touch_presence(&self, channel: &str, member: PresenceMember) -> Vec<PresenceMember>;

    /// Current member list for a presence channel.
    async fn members(&self, channel: &str) -> Vec<PresenceMember>;
}
