// Connection abstraction consumed by the session core.
//
// A session never sees sockets. It sees `Connection` handles: something with
// a stable `ConnectionId` that can attempt to deliver a `ServerMessage`. The
// TCP transport implements this in `server.rs`; tests use `MockConnection`
// below, which records deliveries and can be told to fail.
//
// Identity is the only thing the core relies on. Ids are assigned by the
// transport from a process-wide counter, so two live connections never share
// one.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tictac_protocol::ServerMessage;

use crate::error::SendError;

/// Transport-assigned identity of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Hands out unique `ConnectionId`s.
#[derive(Debug, Default)]
pub struct ConnectionIdAllocator {
    next: AtomicU64,
}

impl ConnectionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// A peer the session can send to.
///
/// `send` may block on I/O. It is called with the session lock held, so a
/// slow peer delays other operations on the same session (and only that
/// session).
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Deliver one message. `SendError::Closed` means the peer is gone.
    fn send(&self, message: &ServerMessage) -> Result<(), SendError>;
}
