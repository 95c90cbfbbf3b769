// Per-session game state manager.
//
// `SessionManager` owns one game: the `Game` rules state, the set of tracked
// connections (the broadcast set), and the role map assigning X and O to at
// most one connection each. Everyone else is a spectator.
//
// Locking discipline: every operation takes the manager's single mutex for
// its whole body, including the sends it performs. Operations on one session
// are therefore fully serialized and every connection sees state changes in
// the same order. The cost is that a slow peer stalls its own session while a
// broadcast is in flight; fan-out is a handful of peers, so this is accepted.
// Different sessions share no lock.
//
// Broadcast is best effort. A send that fails removes that connection from
// the broadcast set and delivery continues to the rest. The failed
// connection keeps its role until the transport reports the disconnect via
// `leave`, which is also the only way a role is freed. Freed roles go to the
// next connection that joins; spectators already present are not promoted.
//
// Invalid moves change nothing and broadcast nothing. The reason is returned
// to the caller, and sent to the offending connection alone when the session
// was created with `explicit_rejections`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tictac_protocol::{Cells, Player, Role, ServerMessage};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId};
use crate::error::{JoinError, MoveRejection, SendError};
use crate::game::{Game, MoveOutcome, Phase};

/// Behavior switches applied to every session a registry creates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Tell a connection why its action was ignored instead of staying silent.
    pub explicit_rejections: bool,
}

/// Point-in-time copy of a session's state, for logging and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameSnapshot {
    pub board: Cells,
    pub turn: Player,
    pub phase: Phase,
    pub first_player: Option<ConnectionId>,
    pub second_player: Option<ConnectionId>,
    pub connections: usize,
}

/// Authoritative state for one game session.
pub struct SessionManager<C: Connection> {
    key: String,
    options: SessionOptions,
    state: Mutex<SessionState<C>>,
}

struct SessionState<C> {
    game: Game,
    /// Broadcast set, in join order.
    connections: Vec<C>,
    roles: HashMap<ConnectionId, Player>,
}

impl<C: Connection> SessionManager<C> {
    /// Empty session: no connections, empty board, X to move.
    pub fn new(key: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            key: key.into(),
            options,
            state: Mutex::new(SessionState {
                game: Game::new(),
                connections: Vec::new(),
                roles: HashMap::new(),
            }),
        }
    }

    /// A panic inside an operation cannot leave `Game` half-updated (each
    /// mutation is a plain assignment), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, SessionState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection. Assigns X, then O, then spectator, and privately
    /// sends the role followed by the current state. Nothing is broadcast.
    ///
    /// If either private send fails the connection is not tracked and any
    /// role it was given is released.
    pub fn join(&self, connection: C) -> Result<Role, JoinError> {
        let mut state = self.lock();
        let id = connection.id();
        if state.roles.contains_key(&id) || state.connections.iter().any(|c| c.id() == id) {
            return Err(JoinError::AlreadyJoined(id));
        }

        let role = if state.roles.len() < 2 {
            let taken_first = state.roles.values().any(|p| *p == Player::FirstPlayer);
            let player = if taken_first {
                Player::SecondPlayer
            } else {
                Player::FirstPlayer
            };
            state.roles.insert(id, player);
            Role::from(player)
        } else {
            Role::Spectator
        };

        let greeting = connection
            .send(&ServerMessage::Role { role })
            .and_then(|()| connection.send(&state.state_message()));
        if let Err(e) = greeting {
            state.roles.remove(&id);
            warn!(session = %self.key, conn = %id, error = %e, "join failed");
            return Err(e.into());
        }

        state.connections.push(connection);
        info!(
            session = %self.key,
            conn = %id,
            ?role,
            connections = state.connections.len(),
            "connection joined"
        );
        Ok(role)
    }

    /// Play `idx` for the connection's role. Applied only when the index is
    /// on the board, the game is in progress, it is this connection's turn
    /// and the cell is empty; otherwise nothing changes.
    ///
    /// An accepted move broadcasts the new state, then a `gameover` message
    /// if it ended the game.
    pub fn act(&self, connection: ConnectionId, idx: i64) -> Result<MoveOutcome, MoveRejection> {
        let mut state = self.lock();
        let mover = state.roles.get(&connection).copied();
        let outcome = match state.game.apply_move(mover, idx) {
            Ok(outcome) => outcome,
            Err(reason) => {
                debug!(session = %self.key, conn = %connection, idx, %reason, "move rejected");
                if self.options.explicit_rejections {
                    state.send_private(&self.key, connection, &ServerMessage::Rejected {
                        reason: reason.to_string(),
                    });
                }
                return Err(reason);
            }
        };

        debug!(
            session = %self.key,
            conn = %connection,
            cell = outcome.cell,
            mark = outcome.player.mark(),
            "move applied"
        );
        let message = state.state_message();
        state.broadcast(&self.key, &message);

        if let Some(result) = outcome.finished {
            info!(session = %self.key, outcome = ?result, "game finished");
            state.broadcast(&self.key, &ServerMessage::GameOver {
                winner: Some(result.into()),
            });
        }
        Ok(outcome)
    }

    /// Start a new game if the current one has finished. Broadcasts the
    /// cleared board and then a `gameover` with no winner so clients drop
    /// their end-of-game display. Returns false, with no effect, while a
    /// game is in progress.
    pub fn reset(&self) -> bool {
        let mut state = self.lock();
        if !state.game.reset() {
            debug!(session = %self.key, "reset ignored, game in progress");
            return false;
        }
        info!(session = %self.key, "game reset");
        let message = state.state_message();
        state.broadcast(&self.key, &message);
        state.broadcast(&self.key, &ServerMessage::GameOver { winner: None });
        true
    }

    /// Forget a connection: stop broadcasting to it and free its role.
    /// Returns whether the connection was known to this session.
    pub fn leave(&self, connection: ConnectionId) -> bool {
        let mut state = self.lock();
        let tracked_before = state.connections.len();
        state.connections.retain(|c| c.id() != connection);
        let was_tracked = state.connections.len() != tracked_before;
        let freed = state.roles.remove(&connection);
        if was_tracked || freed.is_some() {
            info!(
                session = %self.key,
                conn = %connection,
                freed = ?freed,
                connections = state.connections.len(),
                "connection left"
            );
        }
        was_tracked || freed.is_some()
    }

    /// Role currently held by a connection. Unknown connections are
    /// spectators.
    pub fn role_of(&self, connection: ConnectionId) -> Role {
        self.lock()
            .roles
            .get(&connection)
            .map_or(Role::Spectator, |p| Role::from(*p))
    }

    /// Number of tracked (broadcast) connections.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connection_count() == 0
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let state = self.lock();
        let holder = |player: Player| {
            state
                .roles
                .iter()
                .find_map(|(id, p)| (*p == player).then_some(*id))
        };
        GameSnapshot {
            board: state.game.board().cells(),
            turn: state.game.current_mover(),
            phase: state.game.phase(),
            first_player: holder(Player::FirstPlayer),
            second_player: holder(Player::SecondPlayer),
            connections: state.connections.len(),
        }
    }
}

impl<C: Connection> SessionState<C> {
    fn state_message(&self) -> ServerMessage {
        ServerMessage::State {
            board: self.game.board().cells(),
            turn: self.game.current_mover(),
        }
    }

    /// Send `message` to every tracked connection, dropping the ones that
    /// fail. Never aborts early and never returns an error.
    fn broadcast(&mut self, key: &str, message: &ServerMessage) {
        self.connections.retain(|conn| deliver(key, conn, message));
    }

    /// Send to one tracked connection, dropping it on failure.
    fn send_private(&mut self, key: &str, connection: ConnectionId, message: &ServerMessage) {
        if let Some(pos) = self.connections.iter().position(|c| c.id() == connection)
            && !deliver(key, &self.connections[pos], message)
        {
            self.connections.remove(pos);
        }
    }
}

/// Attempt one send and log the failure. Returns whether it succeeded.
fn deliver<C: Connection>(key: &str, conn: &C, message: &ServerMessage) -> bool {
    match conn.send(message) {
        Ok(()) => true,
        Err(SendError::Closed) => {
            debug!(session = key, conn = %conn.id(), "peer gone, dropping from broadcast");
            false
        }
        Err(e) => {
            warn!(session = key, conn = %conn.id(), error = %e, "send failed, dropping from broadcast");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use tictac_protocol::{BOARD_CELLS, Winner};

    use super::*;
    use crate::connection::mock::MockConnection;
    use crate::game::Outcome;

    const X: Player = Player::FirstPlayer;
    const O: Player = Player::SecondPlayer;

    fn manager() -> SessionManager<MockConnection> {
        SessionManager::new("test", SessionOptions::default())
    }

    fn join(session: &SessionManager<MockConnection>, id: u64) -> (MockConnection, Role) {
        let conn = MockConnection::new(id);
        let role = session.join(conn.clone()).unwrap();
        (conn, role)
    }

    fn state(board: Cells, turn: Player) -> ServerMessage {
        ServerMessage::State { board, turn }
    }

    const EMPTY: Cells = [None; BOARD_CELLS];

    #[test]
    fn first_joiner_gets_x_then_state() {
        let session = manager();
        let (a, role) = join(&session, 1);
        assert_eq!(role, Role::FirstPlayer);
        assert_eq!(a.take(), vec![
            ServerMessage::Role {
                role: Role::FirstPlayer
            },
            state(EMPTY, X),
        ]);
    }

    #[test]
    fn third_joiner_is_a_spectator() {
        let session = manager();
        let (_a, ra) = join(&session, 1);
        let (_b, rb) = join(&session, 2);
        let (c, rc) = join(&session, 3);
        let (_d, rd) = join(&session, 4);
        assert_eq!(
            (ra, rb, rc, rd),
            (Role::FirstPlayer, Role::SecondPlayer, Role::Spectator, Role::Spectator)
        );
        assert_eq!(c.take()[0], ServerMessage::Role {
            role: Role::Spectator
        });

        let snap = session.snapshot();
        assert_eq!(snap.first_player, Some(ConnectionId(1)));
        assert_eq!(snap.second_player, Some(ConnectionId(2)));
        assert_eq!(snap.connections, 4);
    }

    #[test]
    fn join_is_private() {
        let session = manager();
        let (a, _) = join(&session, 1);
        a.take();
        let _ = join(&session, 2);
        assert!(a.take().is_empty(), "existing connections hear nothing on join");
    }

    #[test]
    fn joining_twice_is_refused() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let err = session.join(a.clone()).unwrap_err();
        assert!(matches!(err, JoinError::AlreadyJoined(ConnectionId(1))));
        assert_eq!(session.connection_count(), 1);
        assert_eq!(session.role_of(ConnectionId(1)), Role::FirstPlayer);
    }

    #[test]
    fn failed_greeting_releases_the_role() {
        let session = manager();
        let dead = MockConnection::new(1);
        dead.close();
        let err = session.join(dead).unwrap_err();
        assert!(matches!(err, JoinError::Send(SendError::Closed)));
        assert_eq!(session.connection_count(), 0);

        let (_b, role) = join(&session, 2);
        assert_eq!(role, Role::FirstPlayer, "X was never held");
    }

    #[test]
    fn two_player_scenario() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (b, role_b) = join(&session, 2);
        assert_eq!(role_b, Role::SecondPlayer);
        assert_eq!(b.take(), vec![
            ServerMessage::Role {
                role: Role::SecondPlayer
            },
            state(EMPTY, X),
        ]);
        a.take();

        // A plays the centre.
        session.act(ConnectionId(1), 4).unwrap();
        let mut board = EMPTY;
        board[4] = Some(X);
        assert_eq!(a.take(), vec![state(board, O)]);
        assert_eq!(b.take(), vec![state(board, O)]);

        // B tries the same cell: nothing happens.
        assert_eq!(session.act(ConnectionId(2), 4), Err(MoveRejection::CellOccupied(4)));
        assert!(a.take().is_empty());
        assert!(b.take().is_empty());

        // B plays the corner.
        session.act(ConnectionId(2), 0).unwrap();
        board[0] = Some(O);
        assert_eq!(a.take(), vec![state(board, X)]);
        assert_eq!(b.take(), vec![state(board, X)]);
    }

    #[test]
    fn out_of_turn_and_spectator_moves_change_nothing() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (_b, _) = join(&session, 2);
        let (_c, _) = join(&session, 3);
        a.take();
        let before = session.snapshot();

        assert_eq!(session.act(ConnectionId(2), 0), Err(MoveRejection::NotYourTurn));
        assert_eq!(session.act(ConnectionId(3), 0), Err(MoveRejection::NotYourTurn));
        assert_eq!(session.act(ConnectionId(99), 0), Err(MoveRejection::NotYourTurn));
        assert_eq!(session.act(ConnectionId(1), 9), Err(MoveRejection::OutOfRange(9)));
        assert_eq!(session.act(ConnectionId(1), -1), Err(MoveRejection::OutOfRange(-1)));

        assert_eq!(session.snapshot(), before);
        assert!(a.take().is_empty(), "rejections are silent by default");
    }

    #[test]
    fn winning_move_sends_state_then_gameover() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (b, _) = join(&session, 2);
        for (id, idx) in [(1, 0), (2, 4), (1, 1), (2, 5)] {
            session.act(ConnectionId(id), idx).unwrap();
        }
        a.take();
        b.take();

        let outcome = session.act(ConnectionId(1), 2).unwrap();
        assert_eq!(outcome.finished, Some(Outcome::Win(X)));

        let expected_board: Cells = [Some(X), Some(X), Some(X), None, Some(O), Some(O), None, None, None];
        let expected = vec![state(expected_board, O), ServerMessage::GameOver {
            winner: Some(Winner::FirstPlayer),
        }];
        assert_eq!(a.take(), expected);
        assert_eq!(b.take(), expected);
        assert_eq!(session.snapshot().phase, Phase::Finished(Outcome::Win(X)));

        // Finished: further moves are ignored.
        assert_eq!(session.act(ConnectionId(2), 8), Err(MoveRejection::GameFinished));
        assert!(a.take().is_empty());
    }

    #[test]
    fn draw_is_announced() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (_b, _) = join(&session, 2);
        let moves = [0, 1, 2, 4, 3, 5, 7, 6, 8];
        for (turn, idx) in moves.into_iter().enumerate() {
            let id = if turn % 2 == 0 { 1 } else { 2 };
            session.act(ConnectionId(id), idx).unwrap();
        }
        let received = a.take();
        assert_eq!(received.last(), Some(&ServerMessage::GameOver {
            winner: Some(Winner::Draw)
        }));
        let gameovers = received
            .iter()
            .filter(|m| matches!(m, ServerMessage::GameOver { .. }))
            .count();
        assert_eq!(gameovers, 1);
    }

    #[test]
    fn reset_only_after_finish() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (_b, _) = join(&session, 2);
        session.act(ConnectionId(1), 4).unwrap();
        a.take();

        let before = session.snapshot();
        assert!(!session.reset());
        assert_eq!(session.snapshot(), before);
        assert!(a.take().is_empty());

        for (id, idx) in [(2, 0), (1, 3), (2, 1), (1, 5), (2, 2)] {
            session.act(ConnectionId(id), idx).unwrap();
        }
        assert_eq!(session.snapshot().phase, Phase::Finished(Outcome::Win(O)));
        a.take();

        assert!(session.reset());
        assert_eq!(a.take(), vec![state(EMPTY, X), ServerMessage::GameOver {
            winner: None
        }]);
        let snap = session.snapshot();
        assert_eq!(snap.board, EMPTY);
        assert_eq!(snap.turn, X);
        assert_eq!(snap.phase, Phase::InProgress);
        // Roles survive a reset.
        assert_eq!(snap.first_player, Some(ConnectionId(1)));
    }

    #[test]
    fn failed_peer_is_dropped_but_others_still_receive() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (b, _) = join(&session, 2);
        let (c, _) = join(&session, 3);
        a.take();
        c.take();
        b.close();

        session.act(ConnectionId(1), 4).unwrap();
        assert_eq!(a.take().len(), 1);
        assert_eq!(c.take().len(), 1);
        assert_eq!(session.connection_count(), 2);

        // B keeps its role until it leaves, but hears nothing more.
        assert_eq!(session.role_of(ConnectionId(2)), Role::SecondPlayer);
        session.act(ConnectionId(2), 0).unwrap();
        assert_eq!(a.take().len(), 1);
        assert_eq!(c.take().len(), 1);
        assert!(b.take().is_empty());
    }

    #[test]
    fn transport_fault_is_treated_like_a_disconnect() {
        let session = manager();
        let (a, _) = join(&session, 1);
        let (b, _) = join(&session, 2);
        a.take();
        b.break_transport();

        session.act(ConnectionId(1), 0).unwrap();
        assert_eq!(a.take().len(), 1);
        assert_eq!(session.connection_count(), 1);
    }

    #[test]
    fn leave_frees_role_for_next_joiner_not_spectators() {
        let session = manager();
        let (_a, _) = join(&session, 1);
        let (_b, _) = join(&session, 2);
        let (_c, _) = join(&session, 3);

        assert!(session.leave(ConnectionId(1)));
        assert_eq!(session.role_of(ConnectionId(3)), Role::Spectator);
        assert_eq!(session.snapshot().first_player, None);

        let (_d, role) = join(&session, 4);
        assert_eq!(role, Role::FirstPlayer);
        assert_eq!(session.connection_count(), 3);
    }

    #[test]
    fn leave_is_idempotent() {
        let session = manager();
        let (_a, _) = join(&session, 1);
        assert!(session.leave(ConnectionId(1)));
        assert!(!session.leave(ConnectionId(1)));
        assert!(session.is_empty());
    }

    #[test]
    fn game_survives_players_leaving() {
        let session = manager();
        let (_a, _) = join(&session, 1);
        let (_b, _) = join(&session, 2);
        session.act(ConnectionId(1), 4).unwrap();
        session.leave(ConnectionId(2));

        // The replacement inherits O and the board as it stands.
        let (c, role) = join(&session, 3);
        assert_eq!(role, Role::SecondPlayer);
        let mut board = EMPTY;
        board[4] = Some(X);
        assert_eq!(c.take()[1], state(board, O));
        session.act(ConnectionId(3), 0).unwrap();
    }

    #[test]
    fn explicit_rejections_reach_only_the_sender() {
        let session = SessionManager::new("loud", SessionOptions {
            explicit_rejections: true,
        });
        let (a, _) = join(&session, 1);
        let (b, _) = join(&session, 2);
        a.take();
        b.take();

        assert_eq!(session.act(ConnectionId(2), 0), Err(MoveRejection::NotYourTurn));
        assert_eq!(b.take(), vec![ServerMessage::Rejected {
            reason: "it is not your turn".into()
        }]);
        assert!(a.take().is_empty());
    }

    #[test]
    fn concurrent_moves_apply_exactly_once() {
        use std::sync::Arc;
        use std::thread;

        let session = Arc::new(manager());
        let (a, _) = join(&session, 1);
        let (_b, _) = join(&session, 2);
        a.take();

        // X races itself for nine cells; only the first accepted move can
        // land because the turn flips to O afterwards.
        let handles: Vec<_> = (0..BOARD_CELLS as i64)
            .map(|idx| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.act(ConnectionId(1), idx).is_ok())
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 1);
        let snap = session.snapshot();
        assert_eq!(snap.board.iter().filter(|c| c.is_some()).count(), 1);
        assert_eq!(snap.turn, O);
        assert_eq!(a.take().len(), 1);
    }
}
