// tictac_server - authoritative session server for realtime tic-tac-toe.
//
// Clients connect over TCP, name a session in their `hello`, and are given a
// role: the first two become X and O, everyone after that watches. Moves from
// any connection are validated and applied one at a time per session, and
// every resulting state is fanned out to all connections of that session.
//
// Module overview:
// - `game.rs`:       Board, win detection and the turn/phase state machine.
//                    Pure data, no I/O.
// - `connection.rs`: `Connection` trait and `ConnectionId`, the only view of
//                    a peer the core has.
// - `session.rs`:    `SessionManager`, the core: roles, moves, resets,
//                    best-effort broadcast, all under one mutex per session.
// - `registry.rs`:   `SessionRegistry`, session key -> manager, with
//                    create-on-first-use and dispose-when-empty.
// - `server.rs`:     TCP listener and per-connection threads driving the
//                    registry and managers.
// - `client.rs`:     Blocking client used by tests and simple front ends.
// - `config.rs`:     `ServerConfig`, loadable from JSON.
// - `error.rs`:      Error types.
//
// Dependencies: `tictac_protocol` for messages and framing. Logging goes
// through `tracing`; the binary (`main.rs`) installs the subscriber.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod registry;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use registry::SessionRegistry;
pub use server::{ServerHandle, start_server};
pub use session::{SessionManager, SessionOptions};
