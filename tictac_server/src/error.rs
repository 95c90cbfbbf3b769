// Error types for the session server.
//
// - `SendError`:     delivering one message to one connection failed.
// - `JoinError`:     a connection could not be added to a session.
// - `MoveRejection`: why a move was not applied. Its `Display` text is what
//                    clients see in a `rejected` message when explicit
//                    rejections are enabled.
// - `ConfigError`:   the JSON config file could not be read or parsed.
//
// None of these are fatal to the server. A failed send drops one connection,
// a rejected move changes nothing.

use std::io;
use std::path::PathBuf;

use tictac_protocol::FrameError;

use crate::connection::ConnectionId;

/// Failure to deliver a message to a single connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The peer went away (EOF, reset, broken pipe).
    #[error("peer is gone")]
    Closed,
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(FrameError),
}

impl From<FrameError> for SendError {
    fn from(e: FrameError) -> Self {
        if e.is_disconnect() {
            Self::Closed
        } else {
            Self::Transport(e)
        }
    }
}

impl From<io::Error> for SendError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e).into()
    }
}

/// Failure to join a session.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("connection {0} has already joined this session")]
    AlreadyJoined(ConnectionId),
    #[error("failed to deliver join messages: {0}")]
    Send(#[from] SendError),
}

/// Reason a move was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MoveRejection {
    #[error("cell index {0} is out of range")]
    OutOfRange(i64),
    #[error("the game is over")]
    GameFinished,
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("cell {0} is occupied")]
    CellOccupied(usize),
}

/// Failure to load a `ServerConfig` from disk.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
