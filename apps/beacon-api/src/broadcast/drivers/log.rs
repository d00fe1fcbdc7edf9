use std::sync::Arc;

use async_trait::async_trait;

use crate::broadcast::authorizer::ChannelAuthorizer;
use crate::broadcast::broadcaster::{AuthDecision, AuthRequest, Broadcaster, JsonMap};
use crate::broadcast::channel::Channel;
use crate::broadcast::error::BroadcastError;

/// Logs each broadcast instead of delivering it. For development.
pub struct LogBroadcaster {
    authorizer: Arc<ChannelAuthorizer>,
}

impl LogBroadcaster {
    pub fn new(authorizer: Arc<ChannelAuthorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn broadcast(
        &self,
        channels: &[Channel],
        event: &str,
        payload: JsonMap,
    ) -> Result<(), BroadcastError> {
        let channels: Vec<String> = channels.iter().map(Channel::wire_name).collect();
        tracing::info!(
            event = %event,
            channels = ?channels,
            payload = %serde_json::Value::Object(payload),
            "broadcasting event"
        );
        Ok(())
    }

    async fn authorize(&self, request: &AuthRequest) -> AuthDecision {
        self.authorizer
            .authorize(&request.channel, request.principal.as_ref())
    }
}
