// Core value types shared by the wire protocol and the session server.
//
// `Player` names the two sides that can own a cell or hold the turn. `Role`
// adds `Spectator` for connections beyond the first two. `Winner` is the
// end-of-game outcome. All three serialize to the short tokens clients
// render directly: "X", "O", "Spectator", "Draw".
//
// The board itself is a plain `[Option<Player>; BOARD_CELLS]` on the wire;
// the rule logic that owns it lives in `tictac_server::game`.

use serde::{Deserialize, Serialize};

/// Number of cells on the board (3x3, row-major).
pub const BOARD_CELLS: usize = 9;

/// Board contents as sent to clients: `None` is an empty cell.
pub type Cells = [Option<Player>; BOARD_CELLS];

/// One of the two sides of the game. The first player moves first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    #[serde(rename = "X")]
    FirstPlayer,
    #[serde(rename = "O")]
    SecondPlayer,
}

impl Player {
    /// The side that moves after this one.
    pub fn other(self) -> Self {
        match self {
            Self::FirstPlayer => Self::SecondPlayer,
            Self::SecondPlayer => Self::FirstPlayer,
        }
    }

    /// Single-letter mark used in logs and on the wire.
    pub fn mark(self) -> &'static str {
        match self {
            Self::FirstPlayer => "X",
            Self::SecondPlayer => "O",
        }
    }
}

/// Participation level assigned to a connection when it joins a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "X")]
    FirstPlayer,
    #[serde(rename = "O")]
    SecondPlayer,
    Spectator,
}

impl Role {
    /// The side this role plays, or `None` for spectators.
    pub fn player(self) -> Option<Player> {
        match self {
            Self::FirstPlayer => Some(Player::FirstPlayer),
            Self::SecondPlayer => Some(Player::SecondPlayer),
            Self::Spectator => None,
        }
    }
}

impl From<Player> for Role {
    fn from(player: Player) -> Self {
        match player {
            Player::FirstPlayer => Self::FirstPlayer,
            Player::SecondPlayer => Self::SecondPlayer,
        }
    }
}

/// Outcome of a finished game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    #[serde(rename = "X")]
    FirstPlayer,
    #[serde(rename = "O")]
    SecondPlayer,
    Draw,
}

impl From<Player> for Winner {
    fn from(player: Player) -> Self {
        match player {
            Player::FirstPlayer => Self::FirstPlayer,
            Player::SecondPlayer => Self::SecondPlayer,
        }
    }
}
