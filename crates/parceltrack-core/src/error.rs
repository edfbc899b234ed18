//! Error types for the core domain and the push-channel codec.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid tracking number: {0:?}")]
pub struct InvalidTrackingNumber(pub String);

/// A push-channel message that could not be turned into a `TrackingEvent`.
/// The message is dropped; connection and other shipments are unaffected.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed channel message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("channel message has no type")]
    MissingType,

    #[error("unsupported channel message type: {0}")]
    Unsupported(String),
}
