// Protocol messages exchanged between game clients and the session server.
//
// - `ClientMessage`: sent by clients, tagged by an `"action"` field.
// - `ServerMessage`: sent by the server, tagged by a `"type"` field.
//
// The JSON shapes are the contract browser and terminal clients are written
// against, e.g. `{"action":"move","idx":4}` or
// `{"type":"state","board":["X",null,...],"turn":"O"}`. The `lib.rs` tests pin
// the exact encodings.
//
// An unrecognized `"action"` decodes to `ClientMessage::Unknown`; only a
// frame that is not JSON, or lacks a field its action requires, fails to
// decode.
//
// `Move::idx` is a signed integer so that an out-of-range index such as -1
// still decodes and reaches the session, which rejects it like any other
// invalid move instead of tearing down the connection.

use serde::{Deserialize, Serialize};

use crate::types::{Cells, Player, Role, Winner};

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Attach to a session. Must be the first frame on a connection.
    Hello { session: String },
    /// Place the sender's mark on a cell.
    Move { idx: i64 },
    /// Start a new game once the current one has finished.
    Restart,
    /// Leaving gracefully.
    Goodbye,
    /// Any action this server does not know. Ignored rather than treated
    /// as a broken stream, so newer clients can talk to older servers.
    #[serde(other)]
    Unknown,
}

/// Messages sent by the server to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Role assigned on join. Sent privately to the joining connection.
    Role { role: Role },
    /// Full board and the side to move.
    State { board: Cells, turn: Player },
    /// End of game. `None` clears a previous outcome after a restart.
    GameOver { winner: Option<Winner> },
    /// Handshake refused, or an action rejected when explicit rejections
    /// are enabled on the server.
    Rejected { reason: String },
}
