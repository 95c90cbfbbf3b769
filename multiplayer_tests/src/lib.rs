// Test-only game client for multiplayer integration tests.
//
// Wraps the real `NetClient` (from `tictac_server::client`) and keeps a local
// mirror of what a front end would display: board, side to move, the last
// game-over outcome and any rejection reasons. Every received message is also
// kept in `history` so tests can assert on ordering.
//
// The only test-specific code here is the synchronous polling wrappers
// (blocking loops around `NetClient::poll()` and `recv_timeout()`). All
// networking uses the same code paths as a real client.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use tictac_protocol::message::ServerMessage;
use tictac_protocol::types::{BOARD_CELLS, Cells, Player, Role, Winner};
use tictac_server::client::NetClient;

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// How long each poll attempt waits for the next message.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long `assert_quiet` listens before concluding nothing is coming.
const QUIET_WINDOW: Duration = Duration::from_millis(150);

/// A test client wrapping a real NetClient and a rendered view of the game.
pub struct TestGameClient {
    client: NetClient,
    pub board: Cells,
    pub turn: Player,
    /// `Some(outcome)` after a `gameover`; a cleared outcome (`winner: null`)
    /// resets this to `None`.
    pub game_over: Option<Winner>,
    pub rejections: Vec<String>,
    pub history: Vec<ServerMessage>,
}

impl TestGameClient {
    /// Connect to a server and join `session`. Returns once the initial
    /// state that follows the role assignment has been applied.
    pub fn connect(addr: SocketAddr, session: &str) -> Self {
        let client = NetClient::connect(addr, session).expect("TestGameClient::connect failed");
        let mut this = Self {
            client,
            board: [None; BOARD_CELLS],
            turn: Player::FirstPlayer,
            game_over: None,
            rejections: Vec::new(),
            history: Vec::new(),
        };
        this.poll_until("initial state", |c| !c.history.is_empty());
        this
    }

    pub fn role(&self) -> Role {
        self.client.role()
    }

    pub fn play(&mut self, idx: i64) {
        self.client.send_move(idx).expect("send_move failed");
    }

    pub fn restart(&mut self) {
        self.client.send_restart().expect("send_restart failed");
    }

    /// Apply everything received so far. Returns the new messages.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let messages = self.client.poll();
        for msg in &messages {
            self.apply(msg);
        }
        messages
    }

    /// Blocking poll until `done` holds for this client's view.
    pub fn poll_until(&mut self, what: &str, mut done: impl FnMut(&Self) -> bool) {
        let start = Instant::now();
        loop {
            self.drain();
            if done(self) {
                return;
            }
            assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
            if let Some(msg) = self.client.recv_timeout(POLL_INTERVAL) {
                self.apply(&msg);
            }
        }
    }

    /// Blocking poll until the board has exactly `filled` occupied cells.
    pub fn poll_until_filled(&mut self, filled: usize) {
        self.poll_until(&format!("{filled} filled cells"), |c| c.filled() == filled);
    }

    /// Blocking poll until a game-over with an outcome arrives.
    pub fn poll_until_game_over(&mut self) -> Winner {
        self.poll_until("gameover", |c| c.game_over.is_some());
        self.game_over.expect("checked above")
    }

    /// Blocking poll until a `rejected` message arrives; returns its reason.
    pub fn poll_until_rejected(&mut self) -> String {
        self.poll_until("rejected", |c| !c.rejections.is_empty());
        self.rejections.remove(0)
    }

    /// Assert that nothing arrives for a short while.
    pub fn assert_quiet(&mut self) {
        thread::sleep(QUIET_WINDOW);
        let messages = self.drain();
        assert!(messages.is_empty(), "expected silence, got {messages:?}");
    }

    pub fn filled(&self) -> usize {
        self.board.iter().filter(|c| c.is_some()).count()
    }

    /// Send Goodbye and close the connection.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    fn apply(&mut self, msg: &ServerMessage) {
        match msg {
            ServerMessage::State { board, turn } => {
                self.board = *board;
                self.turn = *turn;
            }
            ServerMessage::GameOver { winner } => self.game_over = *winner,
            ServerMessage::Rejected { reason } => self.rejections.push(reason.clone()),
            ServerMessage::Role { .. } => {}
        }
        self.history.push(msg.clone());
    }
}
