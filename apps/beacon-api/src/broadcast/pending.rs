//! Scoped broadcast guard with fire-on-scope-exit semantics.

use std::sync::Arc;

use crate::broadcast::envelope::BroadcastEnvelope;
use crate::broadcast::error::BroadcastError;
use crate::broadcast::manager::BroadcastManager;

/// A broadcast that fires when the guard leaves scope.
///
/// This models "broadcast after the current operation completes": the caller
/// can keep adjusting the pending broadcast and the dispatch happens exactly
/// once, on drop. Call [`send`](Self::send) instead to fire explicitly and
/// observe the result; the drop path is fire-and-forget.
pub struct PendingBroadcast {
    manager: Arc<BroadcastManager>,
    envelope: Option<BroadcastEnvelope>,
}

impl PendingBroadcast {
    pub(crate) fn new(manager: Arc<BroadcastManager>, envelope: BroadcastEnvelope) -> Self {
        Self {
            manager,
            envelope: Some(envelope),
        }
    }

    /// Route through a named broadcaster connection.
    pub fn via(mut self, connection: impl Into<String>) -> Self {
        if let Some(envelope) = self.envelope.as_mut() {
            envelope.connection = Some(connection.into());
        }
        self
    }

    /// Exclude the sender's own connection from delivery.
    pub fn to_others(mut self, socket_id: impl Into<String>) -> Self {
        if let Some(envelope) = self.envelope.as_mut() {
            envelope.socket_id = Some(socket_id.into());
            envelope.include_sender = false;
        }
        self
    }

    /// Fire now and report the outcome. Consumes the guard; drop becomes a
    /// no-op.
    pub async fn send(mut self) -> Result<(), BroadcastError> {
        match self.envelope.take() {
            Some(envelope) => self.manager.queue_envelope(envelope).await,
            None => Ok(()),
        }
    }
}

impl Drop for PendingBroadcast {
    fn drop(&mut self) {
        let Some(envelope) = self.envelope.take() else {
            return;
        };

        let manager = self.manager.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.queue_envelope(envelope).await {
                tracing::error!(error = %e, "scoped broadcast failed");
            }
        });
    }
}
