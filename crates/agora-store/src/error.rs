//! Error types for the storage layer.

use agora_protocol::{MessageId, RoomId};

/// Errors returned by a [`RoomStore`](crate::RoomStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No room with this ID exists.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// No message with this ID exists.
    #[error("message {0} not found")]
    MessageNotFound(MessageId),

    /// The backend could not serve the request (connection lost, etc.).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` for the "does not exist" variants.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RoomNotFound(_) | Self::MessageNotFound(_))
    }
}
