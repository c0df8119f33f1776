//! Subscription lifecycle: the state machine and the task that drives a
//! connection through it.

use std::sync::Arc;
use std::time::Duration;

use agora_protocol::RoomId;
use agora_transport::{Connection, ConnectionId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{BroadcastConfig, RoomRegistry, SubscriberConnection, SubscriberHandle, SubscriberId};

// ---------------------------------------------------------------------------
// SubscriptionState
// ---------------------------------------------------------------------------

/// The lifecycle state of one subscription.
///
/// ```text
/// Validating → Upgrading → Registered → Active → Deregistering → Closed
///      └───────────┴──────────────────────────────────────────────↗
///                          (rejected or upgrade failed)
/// ```
///
/// - **Validating**: request received, room ID not yet checked.
/// - **Upgrading**: room exists, protocol upgrade in progress.
/// - **Registered**: in the room registry; events may start arriving.
/// - **Active**: waiting for the connection to end.
/// - **Deregistering**: out of the registry, transport closing.
/// - **Closed**: nothing left. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Validating,
    Upgrading,
    Registered,
    Active,
    Deregistering,
    Closed,
}

impl SubscriptionState {
    /// The state that normally follows this one, or `None` for `Closed`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Validating => Some(Self::Upgrading),
            Self::Upgrading => Some(Self::Registered),
            Self::Registered => Some(Self::Active),
            Self::Active => Some(Self::Deregistering),
            Self::Deregistering => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if moving to `target` is allowed.
    ///
    /// Besides the normal forward step, a connection that never reached
    /// the registry may jump straight to `Closed`.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
            || (target == Self::Closed
                && matches!(self, Self::Validating | Self::Upgrading))
    }

    /// Returns `true` while the subscriber may be in the registry.
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Active)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "Validating"),
            Self::Upgrading => write!(f, "Upgrading"),
            Self::Registered => write!(f, "Registered"),
            Self::Active => write!(f, "Active"),
            Self::Deregistering => write!(f, "Deregistering"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Tracks the state of one connection from the moment it is accepted.
#[derive(Debug)]
pub struct Lifecycle {
    conn_id: ConnectionId,
    state: SubscriptionState,
}

impl Lifecycle {
    /// Starts a new lifecycle in `Validating`.
    pub fn new(conn_id: ConnectionId) -> Self {
        Self {
            conn_id,
            state: SubscriptionState::Validating,
        }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Moves to `next`. Transitions only go forward.
    pub fn advance(&mut self, next: SubscriptionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            conn_id = %self.conn_id,
            from = %self.state,
            to = %next,
            "subscription state"
        );
        self.state = next;
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Removes the subscriber from the registry if [`Subscription::run`] is
/// dropped before it finishes, e.g. when its task is aborted.
///
/// `Drop` is synchronous, so the deregistration runs as a detached task.
struct DeregisterGuard {
    registry: Arc<RoomRegistry>,
    handle: SubscriberHandle,
    armed: bool,
}

impl DeregisterGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.handle.evict();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        let room_id = self.handle.room_id();
        let subscriber_id = self.handle.id();
        runtime.spawn(async move {
            registry.deregister(room_id, subscriber_id).await;
        });
    }
}

/// One upgraded connection, from registration until it is closed.
///
/// Owns the only path that registers and deregisters the subscriber, so
/// a connection is in the registry exactly while `run` is between
/// `Registered` and `Deregistering`.
pub struct Subscription<C: Connection> {
    connection: SubscriberConnection<C>,
    registry: Arc<RoomRegistry>,
    lifecycle: Lifecycle,
    /// Closing flushes through the transport, so it gets the same
    /// deadline as a write.
    close_timeout: Duration,
}

impl<C: Connection> Subscription<C> {
    /// Wraps an upgraded connection. `lifecycle` should be in `Upgrading`.
    ///
    /// The connection's reader and writer tasks start immediately; it
    /// joins the registry when [`run`](Self::run) is awaited.
    pub fn new(
        conn: C,
        room_id: RoomId,
        lifecycle: Lifecycle,
        registry: Arc<RoomRegistry>,
        config: &BroadcastConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            connection: SubscriberConnection::spawn(conn, room_id, config, shutdown),
            registry,
            lifecycle,
            close_timeout: config.send_timeout,
        }
    }

    pub fn handle(&self) -> &SubscriberHandle {
        self.connection.handle()
    }

    pub fn id(&self) -> SubscriberId {
        self.connection.handle().id()
    }

    pub fn state(&self) -> SubscriptionState {
        self.lifecycle.state()
    }

    /// Registers the subscriber, waits for the connection to end, then
    /// deregisters and closes it.
    ///
    /// The connection ends when the peer closes it, a read or write
    /// fails, the publisher evicts it, or the shutdown token fires.
    /// Teardown runs once whichever of these happens first.
    pub async fn run(self) {
        let Self {
            connection,
            registry,
            mut lifecycle,
            close_timeout,
        } = self;

        let handle = connection.handle().clone();
        let room_id = handle.room_id();
        let subscriber_id = handle.id();
        let mut guard = DeregisterGuard {
            registry: Arc::clone(&registry),
            handle: handle.clone(),
            armed: true,
        };

        lifecycle.advance(SubscriptionState::Registered);
        if !registry.register(handle.clone()).await {
            // Died between upgrade and registration; fall through to teardown.
            handle.evict();
        }

        lifecycle.advance(SubscriptionState::Active);
        connection.cancelled().await;

        lifecycle.advance(SubscriptionState::Deregistering);
        registry.deregister(room_id, subscriber_id).await;
        guard.disarm();

        match tokio::time::timeout(close_timeout, connection.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    conn_id = %lifecycle.conn_id(),
                    %subscriber_id,
                    error = %e,
                    "error closing connection"
                );
            }
            Err(_) => {
                tracing::debug!(
                    conn_id = %lifecycle.conn_id(),
                    %subscriber_id,
                    "close timed out, dropping connection"
                );
            }
        }
        connection.join().await;

        lifecycle.advance(SubscriptionState::Closed);
        tracing::info!(
            conn_id = %lifecycle.conn_id(),
            %room_id,
            %subscriber_id,
            "subscription closed"
        );
    }
}
