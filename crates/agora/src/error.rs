//! Unified error type for Agora.

use agora_protocol::ProtocolError;
use agora_store::StoreError;
use agora_transport::TransportError;
use axum::http::StatusCode;

use crate::SubscribeError;

/// Top-level error that wraps all crate-specific errors.
///
/// `RoomService` operations and the server return this, so callers deal
/// with one type. The `#[from]` attributes let `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum AgoraError {
    /// A transport-level error (bind, accept, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (bad identifier, encode failure).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A storage error (not found, backend unavailable).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A subscription request failed before the upgrade.
    #[error(transparent)]
    Subscribe(#[from] SubscribeError),

    /// The caller supplied an unusable value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl AgoraError {
    /// The HTTP status a request handler should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Protocol(ProtocolError::InvalidId { .. })
            | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Subscribe(e) => e.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
