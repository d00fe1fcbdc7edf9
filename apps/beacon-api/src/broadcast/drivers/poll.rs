//! Poll-based backend: persists broadcasts and serves them on demand.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use beacon_common::CursorGenerator;

use crate::broadcast::authorizer::ChannelAuthorizer;
use crate::broadcast::broadcaster::{
    AuthDecision, AuthRequest, Broadcaster, EventBatch, JsonMap, Pollable,
};
use crate::broadcast::channel::Channel;
use crate::broadcast::error::BroadcastError;
use crate::broadcast::presence::{PresenceMember, PresenceRegistry};
use crate::broadcast::store::{EventStore, PersistedBroadcastRecord};

/// Pull-based transport for clients without a persistent connection.
///
/// `broadcast` appends one record per channel to the event store; clients
/// fetch everything after their cursor via the poll endpoint. Presence is
/// tracked in-process and refreshed on every poll touch.
pub struct PollBroadcaster {
    store: Arc<dyn EventStore>,
    presence: Arc<PresenceRegistry>,
    authorizer: Arc<ChannelAuthorizer>,
    cursors: Arc<CursorGenerator>,
}

impl PollBroadcaster {
    pub fn new(
        store: Arc<dyn EventStore>,
        presence: Arc<PresenceRegistry>,
        authorizer: Arc<ChannelAuthorizer>,
        cursors: Arc<CursorGenerator>,
    ) -> Self {
        Self {
            store,
            presence,
            authorizer,
            cursors,
        }
    }
}

#[async_trait]
impl Broadcaster for PollBroadcaster {
    async fn broadcast(
        &self,
        channels: &[Channel],
        event: &str,
        mut payload: JsonMap,
    ) -> Result<(), BroadcastError> {
        let socket = payload
            .remove("socket")
            .and_then(|value| value.as_str().map(str::to_string));
        let data = Value::Object(payload);
        let now = Utc::now();

        for channel in channels {
            // Cursor ids are generated in append order, so per-channel id
            // order equals publish order.
            self.store
                .append(PersistedBroadcastRecord {
                    id: self.cursors.generate(),
                    channel: channel.wire_name(),
                    event: event.to_string(),
                    payload: data.clone(),
                    socket: socket.clone(),
                    created_at: now,
                })
                .await?;
        }

        Ok(())
    }

    async fn authorize(&self, request: &AuthRequest) -> AuthDecision {
        self.authorizer
            .authorize(&request.channel, request.principal.as_ref())
    }

    fn as_pollable(&self) -> Option<&dyn Pollable> {
        Some(self)
    }
}

#[async_trait]
impl Pollable for PollBroadcaster {
    async fn events_since(
        &self,
        channels: &[String],
        after: Option<i64>,
    ) -> Result<EventBatch, BroadcastError> {
        let events = self.store.since(channels, after).await?;
        let last_event_id = events
            .last()
            .map(|record| record.id)
            .or(after)
            .unwrap_or(0);

        Ok(EventBatch {
            events,
            last_event_id,
        })
    }

    async fn touch_presence(&self, channel: &str, member: PresenceMember) -> Vec<PresenceMember> {
        self.presence.touch(channel, member)
    }

    async fn members(&self, channel: &str) -> Vec<PresenceMember> {
        self.presence.members(channel)
    }
}
