//! One live subscriber: the handle the registry stores, and the
//! connection wrapper that owns the transport.
//!
//! ```text
//!  publish ──try_send──→ [bounded queue] ──writer task──→ Connection::send
//!                                              │            (send_timeout)
//!                                              └─ every idle_timeout/2 ─→ Connection::ping
//!  Connection::recv ──reader task──→ close / error / idle ──→ cancel token
//! ```
//!
//! Every failure path ends in the same place: the handle is marked dead
//! and its cancellation token fires, which wakes the owning
//! [`Subscription`](crate::Subscription).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use agora_protocol::RoomId;
use agora_transport::{Connection, Inbound};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{BroadcastConfig, BroadcastError};

/// An encoded event, shared by every subscriber it is sent to.
pub type Frame = Arc<[u8]>;

/// Counter for generating unique subscriber IDs.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one subscriber handle for its whole life.
///
/// IDs are never reused within a process, so a stale deregistration can
/// never remove a newer subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// State shared between a handle, its clones, and its tasks.
struct SubscriberState {
    id: SubscriberId,
    room_id: RoomId,
    alive: AtomicBool,
    cancel: CancellationToken,
}

impl SubscriberState {
    fn evict(&self) {
        self.alive.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// SubscriberHandle
// ---------------------------------------------------------------------------

/// The registry's view of one subscriber.
///
/// Cheap to clone; all clones share the liveness flag and the
/// cancellation token.
#[derive(Clone)]
pub struct SubscriberHandle {
    state: Arc<SubscriberState>,
    outbound: mpsc::Sender<Frame>,
    capacity: usize,
}

impl SubscriberHandle {
    /// Creates a handle and the receiving end of its outbound queue.
    ///
    /// [`SubscriberConnection::spawn`] calls this and hands the receiver
    /// to its writer task; transports that drain frames some other way
    /// can use it directly.
    pub fn channel(
        room_id: RoomId,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<Frame>) {
        let capacity = capacity.max(BroadcastConfig::MIN_OUTBOUND_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            state: Arc::new(SubscriberState {
                id: SubscriberId::next(),
                room_id,
                alive: AtomicBool::new(true),
                cancel,
            }),
            outbound: tx,
            capacity,
        };
        (handle, rx)
    }

    /// Returns the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.state.id
    }

    /// Returns the room this subscriber watches.
    pub fn room_id(&self) -> RoomId {
        self.state.room_id
    }

    /// `false` once any send, write, or read has failed, or the
    /// subscription was cancelled.
    pub fn is_alive(&self) -> bool {
        self.state.alive.load(Ordering::Acquire)
            && !self.state.cancel.is_cancelled()
    }

    /// The token the owning subscription waits on.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.state.cancel
    }

    /// Queues one frame for delivery. Never waits.
    ///
    /// # Errors
    /// - [`BroadcastError::Lagged`]: the queue is full
    /// - [`BroadcastError::Closed`]: the handle is dead or its writer
    ///   has stopped
    ///
    /// Both errors mark the handle dead.
    pub fn send(&self, frame: Frame) -> Result<(), BroadcastError> {
        if !self.is_alive() {
            return Err(BroadcastError::Closed(self.id()));
        }
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.mark_dead();
                Err(BroadcastError::Lagged(self.id(), self.capacity))
            }
            Err(TrySendError::Closed(_)) => {
                self.mark_dead();
                Err(BroadcastError::Closed(self.id()))
            }
        }
    }

    /// Marks the handle dead and fires its cancellation token.
    pub fn evict(&self) {
        self.state.evict();
    }

    fn mark_dead(&self) {
        self.state.alive.store(false, Ordering::Release);
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.state.id)
            .field("room_id", &self.state.room_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SubscriberConnection
// ---------------------------------------------------------------------------

/// Owns one upgraded transport connection and the two tasks driving it.
///
/// Created by [`Subscription`](crate::Subscription), which is the only
/// code that closes it.
pub struct SubscriberConnection<C: Connection> {
    conn: Arc<C>,
    handle: SubscriberHandle,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    closed: AtomicBool,
}

impl<C: Connection> SubscriberConnection<C> {
    /// Wraps `conn` and spawns its writer and reader tasks.
    ///
    /// The cancellation token is a child of `shutdown`, so cancelling
    /// `shutdown` unblocks every subscription at once.
    pub fn spawn(
        conn: C,
        room_id: RoomId,
        config: &BroadcastConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        let conn = Arc::new(conn);
        let (handle, outbound) = SubscriberHandle::channel(
            room_id,
            config.outbound_capacity,
            shutdown.child_token(),
        );

        let writer = tokio::spawn(write_loop(
            Arc::clone(&conn),
            Arc::clone(&handle.state),
            outbound,
            config.send_timeout,
            config.idle_timeout.map(keepalive),
        ));
        let reader = tokio::spawn(read_loop(
            Arc::clone(&conn),
            Arc::clone(&handle.state),
            config.idle_timeout,
        ));

        Self {
            conn,
            handle,
            writer,
            reader,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the handle to register with the room registry.
    pub fn handle(&self) -> &SubscriberHandle {
        &self.handle
    }

    /// Resolves when the connection should be torn down.
    pub async fn cancelled(&self) {
        self.handle.cancel_token().cancelled().await
    }

    /// Closes the transport. Only the first call does anything.
    pub async fn close(&self) -> Result<(), C::Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.handle.evict();
        self.conn.close().await
    }

    /// Waits for the reader and writer tasks to exit.
    ///
    /// Both tasks watch the cancellation token, so this returns
    /// promptly once the subscriber has been cancelled.
    pub async fn join(self) {
        self.handle.evict();
        let _ = self.writer.await;
        let _ = self.reader.await;
    }
}

/// Pings at half the idle timeout, so a peer that answers never goes
/// quiet for a whole timeout.
fn keepalive(idle_timeout: Duration) -> Interval {
    let period = (idle_timeout / 2).max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// What the writer puts on the wire next.
enum Outgoing {
    Frame(Frame),
    Ping,
}

/// Drains the outbound queue into the transport, one bounded write at a
/// time. Queue order is delivery order; keepalive pings slot in between
/// frames.
async fn write_loop<C: Connection>(
    conn: Arc<C>,
    state: Arc<SubscriberState>,
    mut outbound: mpsc::Receiver<Frame>,
    send_timeout: Duration,
    mut keepalive: Option<Interval>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => Outgoing::Frame(frame),
                None => break,
            },
            _ = next_tick(&mut keepalive) => Outgoing::Ping,
        };

        let write = async {
            match &next {
                Outgoing::Frame(frame) => conn.send(frame).await,
                Outgoing::Ping => conn.ping().await,
            }
        };
        let result = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => break,
            result = tokio::time::timeout(send_timeout, write) => result,
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(
                    subscriber_id = %state.id,
                    error = %e,
                    "write failed, evicting subscriber"
                );
                state.evict();
                break;
            }
            Err(_) => {
                tracing::warn!(
                    subscriber_id = %state.id,
                    room_id = %state.room_id,
                    timeout_ms = send_timeout.as_millis() as u64,
                    "write timed out, evicting subscriber"
                );
                state.evict();
                break;
            }
        }
    }
}

/// Watches the read side for closure. Payloads are ignored: the channel
/// only carries server-to-client events. Any frame, payload or control,
/// restarts the idle timer.
async fn read_loop<C: Connection>(
    conn: Arc<C>,
    state: Arc<SubscriberState>,
    idle_timeout: Option<Duration>,
) {
    loop {
        let next = tokio::select! {
            _ = state.cancel.cancelled() => return,
            next = recv_within(&*conn, idle_timeout) => next,
        };

        match next {
            Ok(Some(Some(Inbound::Data(_) | Inbound::Heartbeat))) => continue,
            Ok(Some(None)) => {
                tracing::debug!(subscriber_id = %state.id, "closed by peer");
                break;
            }
            Ok(None) => {
                tracing::debug!(subscriber_id = %state.id, "idle timeout");
                break;
            }
            Err(e) => {
                tracing::debug!(
                    subscriber_id = %state.id,
                    error = %e,
                    "read failed"
                );
                break;
            }
        }
    }
    state.evict();
}

/// Reads one frame. `Ok(None)` means the idle timeout elapsed first.
async fn recv_within<C: Connection>(
    conn: &C,
    idle_timeout: Option<Duration>,
) -> Result<Option<Option<Inbound>>, C::Error> {
    match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        },
        None => conn.recv().await.map(Some),
    }
}
