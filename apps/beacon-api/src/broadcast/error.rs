use thiserror::Error;

/// Errors raised by the broadcast dispatch core.
///
/// Configuration-class variants (`UnknownConnection`, `UnknownDriver`,
/// `Configuration`) are fatal at resolution time and never retried. Transport
/// failures propagate out of `broadcast()` so the queue layer can apply its
/// retry policy.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("unknown broadcast connection `{0}`")]
    UnknownConnection(String),

    #[error("unknown broadcast driver `{0}`")]
    UnknownDriver(String),

    #[error("invalid broadcast configuration: {0}")]
    Configuration(String),

    #[error("broadcast transport failed: {0}")]
    Transport(String),

    #[error("broadcast payload could not be serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}
