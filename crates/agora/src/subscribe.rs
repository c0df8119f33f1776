//! Subscription entry point: `GET /subscribe/{room_id}`.
//!
//! A request is validated *before* the WebSocket upgrade. Only a
//! well-formed ID for an existing room is upgraded; anything else gets a
//! plain HTTP error and never touches the registry.

use std::sync::Arc;

use agora_broadcast::{Lifecycle, Subscription, SubscriptionState};
use agora_protocol::{ProtocolError, RoomId};
use agora_store::{RoomStore, StoreError};
use agora_transport::{ConnectionId, WebSocketConnection};
use axum::extract::ws::WebSocket;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::server::ServerState;

/// Route of the subscription endpoint.
pub const SUBSCRIBE_ROUTE: &str = "/subscribe/{room_id}";

/// Why a subscription request was turned away.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// The path segment is not a room ID.
    #[error("invalid room id: {0}")]
    InvalidRoomId(#[source] ProtocolError),

    /// The room ID is well formed but no such room exists.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The room lookup itself failed.
    #[error("room lookup failed: {0}")]
    Store(#[source] StoreError),

    /// The room lookup did not finish within the handshake timeout.
    #[error("timed out validating the request")]
    Timeout,

    /// The server started shutting down while the request was validated.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The room is fine but the request cannot be upgraded.
    #[error("cannot upgrade: {0}")]
    Upgrade(#[source] WebSocketUpgradeRejection),
}

impl SubscribeError {
    /// The HTTP status to reject with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRoomId(_) => StatusCode::BAD_REQUEST,
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upgrade(rejection) => rejection.status(),
        }
    }

    /// Response body sent with the rejection. Internal details stay in
    /// the logs.
    fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidRoomId(_) => "invalid room",
            Self::RoomNotFound(_) => "room not found",
            Self::ShuttingDown => "server is shutting down",
            Self::Upgrade(_) => "websocket upgrade required",
            Self::Store(_) | Self::Timeout => "something went wrong",
        }
    }
}

impl IntoResponse for SubscribeError {
    fn into_response(self) -> Response {
        (self.status(), self.client_message()).into_response()
    }
}

/// Parses the room ID segment of a subscription path.
///
/// No store lookup happens here, so a malformed ID is always a 400 and
/// never a 404.
pub fn parse_room_id(raw: &str) -> Result<RoomId, SubscribeError> {
    RoomId::parse(raw).map_err(SubscribeError::InvalidRoomId)
}

/// Axum handler for [`SUBSCRIBE_ROUTE`].
///
/// The upgrade extractor goes last and is taken as a `Result`, so the
/// room is checked before the request is judged as a WebSocket upgrade.
pub(crate) async fn subscribe<S: RoomStore>(
    Path(raw_room_id): Path<String>,
    State(state): State<Arc<ServerState<S>>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let conn_id = ConnectionId::next();
    let mut lifecycle = Lifecycle::new(conn_id);

    // --- Validating ---
    let accepted = validate(&raw_room_id, &state).await.and_then(|room_id| {
        upgrade
            .map(|ws| (room_id, ws))
            .map_err(SubscribeError::Upgrade)
    });
    let (room_id, ws) = match accepted {
        Ok(accepted) => accepted,
        Err(e) => {
            lifecycle.advance(SubscriptionState::Closed);
            tracing::debug!(
                %conn_id,
                status = e.status().as_u16(),
                error = %e,
                "rejecting subscription"
            );
            return e.into_response();
        }
    };

    // --- Upgrading ---
    lifecycle.advance(SubscriptionState::Upgrading);
    let tracker = state.tracker.clone();
    ws.on_failed_upgrade(move |e| {
        tracing::debug!(%conn_id, error = %e, "websocket upgrade failed");
    })
    .on_upgrade(move |socket| {
        tracker.track_future(run_subscription(socket, room_id, lifecycle, state))
    })
}

/// Registered → Active → Deregistering → Closed.
async fn run_subscription<S: RoomStore>(
    socket: WebSocket,
    room_id: RoomId,
    lifecycle: Lifecycle,
    state: Arc<ServerState<S>>,
) {
    let conn = WebSocketConnection::with_id(socket, lifecycle.conn_id());
    tracing::debug!(conn_id = %lifecycle.conn_id(), %room_id, "subscriber connected");

    Subscription::new(
        conn,
        room_id,
        lifecycle,
        Arc::clone(&state.registry),
        &state.config.broadcast,
        &state.shutdown,
    )
    .run()
    .await;
}

/// Checks the room ID and that the room exists. Gives up at the
/// handshake timeout or as soon as the server starts shutting down.
pub(crate) async fn validate<S: RoomStore>(
    raw_room_id: &str,
    state: &ServerState<S>,
) -> Result<RoomId, SubscribeError> {
    let room_id = parse_room_id(raw_room_id)?;

    let lookup = tokio::time::timeout(
        state.config.handshake_timeout,
        state.store.get_room(room_id),
    );
    let found = tokio::select! {
        biased;
        _ = state.shutdown.cancelled() => return Err(SubscribeError::ShuttingDown),
        found = lookup => found.map_err(|_| SubscribeError::Timeout)?,
    };

    found.map_err(|e| match e {
        StoreError::RoomNotFound(id) => SubscribeError::RoomNotFound(id),
        other => SubscribeError::Store(other),
    })?;
    Ok(room_id)
}
