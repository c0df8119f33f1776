//! Transport abstraction layer for Agora.
//!
//! Provides the [`Connection`] trait that the broadcaster writes through,
//! plus an adapter over an upgraded axum WebSocket.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WebSocketConnection`] over `axum::extract::ws`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates an ID no other connection in this process has used.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What [`Connection::recv`] read from the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text or binary payload.
    Data(Vec<u8>),
    /// A ping or pong. Carries nothing, but shows the peer is still there.
    Heartbeat,
}

/// A single upgraded connection that can send and receive bytes.
///
/// The returned futures are `Send` so that a connection can be driven
/// from spawned reader and writer tasks.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Sends data to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receives the next frame from the remote peer, including control
    /// frames.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Inbound>, Self::Error>> + Send;

    /// Sends a keepalive the peer is expected to answer.
    fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
