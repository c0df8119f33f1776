//! [`Connection`] over an upgraded `axum` WebSocket.
//!
//! The HTTP side (routing, extracting the room ID, the upgrade itself)
//! belongs to the router. This adapter only sees the socket once
//! `WebSocketUpgrade::on_upgrade` hands it over.

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Inbound, TransportError};

/// A single upgraded WebSocket connection.
///
/// Read and write halves sit behind separate locks, so a task parked in
/// `recv` never blocks a concurrent `send`.
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
}

impl WebSocketConnection {
    /// Wraps a socket under a freshly allocated ID.
    pub fn new(socket: WebSocket) -> Self {
        Self::with_id(socket, ConnectionId::next())
    }

    /// Wraps a socket, keeping an ID assigned before the upgrade.
    pub fn with_id(socket: WebSocket, id: ConnectionId) -> Self {
        let (sink, stream) = socket.split();
        tracing::debug!(%id, "WebSocket connection opened");
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }

    async fn send_message(&self, msg: Message) -> Result<(), TransportError> {
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // JSON payloads go out as text frames so browsers get a string.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.send_message(msg).await
    }

    async fn recv(&self) -> Result<Option<Inbound>, Self::Error> {
        let msg = self.stream.lock().await.next().await;
        match msg {
            Some(Ok(Message::Binary(data))) => Ok(Some(Inbound::Data(data.to_vec()))),
            Some(Ok(Message::Text(text))) => {
                Ok(Some(Inbound::Data(text.as_str().as_bytes().to_vec())))
            }
            // The socket answers pings on its own; we only note the activity.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(Some(Inbound::Heartbeat)),
            Some(Ok(Message::Close(_))) | None => Ok(None),
            Some(Err(e)) => Err(TransportError::ReceiveFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                e,
            ))),
        }
    }

    async fn ping(&self) -> Result<(), Self::Error> {
        self.send_message(Message::Ping(Default::default())).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
