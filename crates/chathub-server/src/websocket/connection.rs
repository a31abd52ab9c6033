//! WebSocket client connection state.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use axum::extract::ws::Utf8Bytes;
use chathub_core::{ConnectionId, Identity};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Created, not yet in the registry.
    Connecting = 0,
    /// Present in the registry and accepting outbound events.
    Registered = 1,
    /// Outbound queue closed; the write loop is flushing what is left.
    Draining = 2,
    /// Both loops have finished.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Registered,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueue {
    /// The payload is in the outbound queue.
    Queued,
    /// The queue is at capacity; nothing was queued.
    Full,
    /// The queue has been closed; nothing was queued.
    Closed,
}

/// Represents a connected WebSocket client.
///
/// The read and write loops own the transport; everything else (registry,
/// dispatcher) reaches the client only through [`try_enqueue`](Self::try_enqueue)
/// and [`close`](Self::close).
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Authenticated owner.
    pub identity: Identity,
    /// Sender half of the outbound queue. `None` once closed.
    tx: Mutex<Option<mpsc::Sender<Utf8Bytes>>>,
    /// Signals both loops to stop.
    shutdown: CancellationToken,
    state: AtomicU8,
    /// When this connection was established.
    pub connected_at: Instant,
    /// When the last Pong was received.
    last_pong: Mutex<Instant>,
    /// Count of enqueues refused because the queue was full.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection with a bounded outbound queue.
    pub fn new(identity: Identity, capacity: usize) -> (Self, mpsc::Receiver<Utf8Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Instant::now();
        let conn = Self {
            id: ConnectionId::new(),
            identity,
            tx: Mutex::new(Some(tx)),
            shutdown: CancellationToken::new(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            connected_at: now,
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        };
        (conn, rx)
    }

    /// Owner's stable user ID.
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    /// Owner's display name.
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Push a serialized payload without waiting.
    pub fn try_enqueue(&self, payload: Utf8Bytes) -> Enqueue {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Enqueue::Closed;
        };
        match tx.try_send(payload) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Enqueue::Full
            }
            Err(TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Close the outbound queue and signal shutdown.
    ///
    /// Items already queued stay readable; the receiver sees `None` after
    /// them. Returns `true` only for the call that actually closed the queue.
    pub fn close(&self) -> bool {
        let closed_now = self.tx.lock().take().is_some();
        self.shutdown.cancel();
        self.advance(ConnectionState::Draining);
        closed_now
    }

    /// Whether the outbound queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Move `Connecting → Registered`. No effect in any other state.
    pub fn mark_registered(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Registered as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Terminal transition, taken once both loops are done.
    pub fn mark_closed(&self) {
        let _ = self.close();
        self.advance(ConnectionState::Closed);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Token cancelled when the connection is closed.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Record a Pong from the peer.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// When the last Pong (or connection establishment) happened.
    pub fn last_pong(&self) -> Instant {
        *self.last_pong.lock()
    }

    /// Total enqueues refused because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn advance(&self, to: ConnectionState) {
        let _ = self.state.fetch_max(to as u8, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("username", &self.identity.username)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
