// Tic-tac-toe rules and the per-game turn state machine.
//
// `Game` is pure data: no connections, no locking, no I/O. `SessionManager`
// (see `session.rs`) owns one behind its mutex and turns the results of
// `apply_move`/`reset` into broadcasts.
//
// State machine:
//   InProgress --valid move--> InProgress          (no line, cells left)
//   InProgress --valid move--> Finished(outcome)   (winning line or full board)
//   Finished   --reset-------> InProgress          (board cleared, X to move)
//   InProgress --reset-------> InProgress          (no-op)
//   Finished   --any move----> Finished            (rejected)
//
// Invariant: `phase` is `Finished` exactly when the board holds a winning
// line or has no empty cell. Only `apply_move` fills cells and only `reset`
// clears them, so the invariant is re-established at the end of each.

use tictac_protocol::{BOARD_CELLS, Cells, Player, Winner};

use crate::error::MoveRejection;

/// The 8 index triples that win the game: rows, columns, diagonals.
pub const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// 3x3 board, row-major.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Board {
    cells: Cells,
}

impl Board {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the cells in wire layout.
    pub fn cells(&self) -> Cells {
        self.cells
    }

    /// Contents of one cell, `None` if empty or out of range.
    pub fn get(&self, idx: usize) -> Option<Player> {
        self.cells.get(idx).copied().flatten()
    }

    /// The player owning a complete line, if any.
    pub fn winner(&self) -> Option<Player> {
        WINNING_LINES.iter().find_map(|&[a, b, c]| {
            let first = self.cells[a]?;
            (self.cells[b] == Some(first) && self.cells[c] == Some(first)).then_some(first)
        })
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Number of occupied cells.
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

/// How a finished game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Win(Player),
    Draw,
}

impl From<Outcome> for Winner {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win(player) => player.into(),
            Outcome::Draw => Self::Draw,
        }
    }
}

/// Whether moves are still accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    InProgress,
    Finished(Outcome),
}

/// Result of an accepted move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    pub cell: usize,
    pub player: Player,
    /// Set when this move ended the game.
    pub finished: Option<Outcome>,
}

/// One game's board and turn state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Game {
    board: Board,
    current_mover: Player,
    phase: Phase,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    /// Empty board, X to move.
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            current_mover: Player::FirstPlayer,
            phase: Phase::InProgress,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn current_mover(&self) -> Player {
        self.current_mover
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    /// Validate a client-supplied index.
    pub fn cell_index(idx: i64) -> Result<usize, MoveRejection> {
        usize::try_from(idx)
            .ok()
            .filter(|i| *i < BOARD_CELLS)
            .ok_or(MoveRejection::OutOfRange(idx))
    }

    /// Apply a move for `mover` (`None` for spectators). On success the cell
    /// is filled, the turn flips and the phase is updated.
    pub fn apply_move(
        &mut self,
        mover: Option<Player>,
        idx: i64,
    ) -> Result<MoveOutcome, MoveRejection> {
        let cell = Self::cell_index(idx)?;
        if self.is_finished() {
            return Err(MoveRejection::GameFinished);
        }
        let player = match mover {
            Some(p) if p == self.current_mover => p,
            _ => return Err(MoveRejection::NotYourTurn),
        };
        if self.board.get(cell).is_some() {
            return Err(MoveRejection::CellOccupied(cell));
        }

        self.board.cells[cell] = Some(player);
        self.current_mover = player.other();

        let finished = if let Some(winner) = self.board.winner() {
            Some(Outcome::Win(winner))
        } else if self.board.is_full() {
            Some(Outcome::Draw)
        } else {
            None
        };
        if let Some(outcome) = finished {
            self.phase = Phase::Finished(outcome);
        }

        Ok(MoveOutcome {
            cell,
            player,
            finished,
        })
    }

    /// Start over if the game has finished. Returns false (and changes
    /// nothing) while a game is in progress.
    pub fn reset(&mut self) -> bool {
        if !self.is_finished() {
            return false;
        }
        *self = Self::new();
        true
    }
}
