use std::sync::Arc;

use async_trait::async_trait;

use crate::broadcast::authorizer::ChannelAuthorizer;
use crate::broadcast::broadcaster::{AuthDecision, AuthRequest, Broadcaster, JsonMap};
use crate::broadcast::channel::Channel;
use crate::broadcast::error::BroadcastError;

/// Discards every broadcast. Authorization still runs normally so clients
/// behave identically against this backend.
pub struct NullBroadcaster {
    authorizer: Arc<ChannelAuthorizer>,
}

impl NullBroadcaster {
    pub fn new(authorizer: Arc<ChannelAuthorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl Broadcaster for NullBroadcaster {
    async fn broadcast(
        &self,
        _channels: &[Channel],
        _event: &str,
        _payload: JsonMap,
    ) -> Result<(), BroadcastError> {
        Ok(())
    }

    async fn authorize(&self, request: &AuthRequest) -> AuthDecision {
        self.authorizer
            .authorize(&request.channel, request.principal.as_ref())
    }
}
