//! Error types for the broadcast layer.

use crate::SubscriberId;

/// Why a frame could not be handed to a subscriber.
///
/// These never leave the publisher: a failed subscriber is evicted and
/// the producer carries on.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// The subscriber's writer is gone or the handle was already evicted.
    #[error("subscriber {0} is closed")]
    Closed(SubscriberId),

    /// The subscriber's outbound queue is full.
    #[error("subscriber {0} fell behind ({1} frames queued)")]
    Lagged(SubscriberId, usize),
}
