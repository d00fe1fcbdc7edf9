//! Redis pub/sub publisher backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::broadcast::authorizer::ChannelAuthorizer;
use crate::broadcast::broadcaster::{AuthDecision, AuthRequest, Broadcaster, JsonMap};
use crate::broadcast::channel::Channel;
use crate::broadcast::error::BroadcastError;

/// Publishes one JSON message per channel over Redis pub/sub.
///
/// The connection manager is established lazily on first publish so that
/// backend construction stays pure configuration binding.
pub struct RedisBroadcaster {
    client: redis::Client,
    conn: tokio::sync::OnceCell<redis::aio::ConnectionManager>,
    prefix: String,
    authorizer: Arc<ChannelAuthorizer>,
}

impl RedisBroadcaster {
    pub fn new(
        url: &str,
        prefix: impl Into<String>,
        authorizer: Arc<ChannelAuthorizer>,
    ) -> Result<Self, BroadcastError> {
        let client = redis::Client::open(url)
            .map_err(|e| BroadcastError::Configuration(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            conn: tokio::sync::OnceCell::new(),
            prefix: prefix.into(),
            authorizer,
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
impl Broadcaster for RedisBroadcaster {
    async fn broadcast(
        &self,
        channels: &[Channel],
        event: &str,
        mut payload: JsonMap,
    ) -> Result<(), BroadcastError> {
        use redis::AsyncCommands;

        let socket = payload
            .remove("socket")
            .and_then(|value| value.as_str().map(str::to_string));

        let message = serde_json::to_string(&serde_json::json!({
            "event": event,
            "data": Value::Object(payload),
            "socket": socket,
        }))?;

        let mut conn = self.connection().await?;
        for channel in channels {
            let wire = format!("{}{}", self.prefix, channel.wire_name());
            // Zero subscribers is fine; PUBLISH just returns 0.
            conn.publish::<_, _, ()>(&wire, &message).await.map_err(|e| {
                tracing::error!(channel = %wire, error = %e, "redis publish failed");
                BroadcastError::Transport(e.to_string())
            })?;
        }

        Ok(())
    }

    async fn authorize(&self, request: &AuthRequest) -> AuthDecision {
        self.authorizer
            .authorize(&request.channel, request.principal.as_ref())
    }
}
