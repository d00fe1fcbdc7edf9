//! The asynchronous delivery unit handed to the job queue.

use serde_json::Value;

use beacon_common::id::{prefix, prefixed_ulid};

use crate::broadcast::envelope::BroadcastEnvelope;
use crate::broadcast::error::BroadcastError;
use crate::broadcast::manager::BroadcastManager;

/// One queued broadcast delivery.
///
/// The envelope inside is a frozen snapshot taken at enqueue time.
/// `unique_key` is set when the enqueue acquired a uniqueness lock; the
/// worker releases it after `handle` returns.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub id: String,
    pub envelope: BroadcastEnvelope,
    pub unique_key: Option<String>,
}

impl DeliveryJob {
    pub fn new(envelope: BroadcastEnvelope, unique_key: Option<String>) -> Self {
        Self {
            id: prefixed_ulid(prefix::JOB),
            envelope,
            unique_key,
        }
    }

    /// Resolve the target broadcaster and deliver the envelope.
    ///
    /// When the sender is excluded (`to_others`), the sender's socket id is
    /// merged into the payload under the reserved `socket` key so the
    /// transport can suppress the echo. Transport errors propagate; retry is
    /// the queue's concern.
    pub async fn handle(&self, manager: &BroadcastManager) -> Result<(), BroadcastError> {
        let broadcaster = manager.connection(self.envelope.connection.as_deref())?;

        let mut payload = self.envelope.payload.clone();
        if !self.envelope.include_sender {
            if let Some(socket) = &self.envelope.socket_id {
                payload.insert("socket".to_string(), Value::String(socket.clone()));
            }
        }

        broadcaster
            .broadcast(&self.envelope.channels, &self.envelope.event, payload)
            .await
    }
}
