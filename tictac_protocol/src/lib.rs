// tictac_protocol - wire protocol for the tic-tac-toe session server.
//
// Defines the message vocabulary and framing used by `tictac_server` and its
// clients. Shared by both sides; contains no game rules and no networking.
//
// Module overview:
// - `types.rs`:    `Player`, `Role`, `Winner` and the `Cells` board array.
// - `message.rs`:  `ClientMessage` (tagged by "action") and `ServerMessage`
//                  (tagged by "type").
// - `framing.rs`:  4-byte big-endian length prefix + JSON payload over any
//                  `Read`/`Write`, with a `FrameError` type.
//
// Design decisions:
// - **JSON payloads.** Clients render the decoded documents directly, so the
//   field names and tokens ("X", "O", null) are part of the contract.
// - **No async runtime.** Framing works on blocking `std::io` streams and
//   buffered wrappers alike.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{FrameError, MAX_FRAME_SIZE, read_frame, read_raw, write_frame, write_raw};
pub use message::{ClientMessage, ServerMessage};
pub use types::{BOARD_CELLS, Cells, Player, Role, Winner};
