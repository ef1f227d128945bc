// Core value types for the duel protocol.
//
// `ConnectionId` is the relay-assigned identity of one client connection. The
// piece types (`Gem`, `DropGroup`) and board coordinates (`Location`,
// `Placement`) are what moves and turn updates carry. The relay treats them as
// plain data; only the rules collaborator interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Relay-assigned connection ID. Allocated from a monotonically increasing
/// counter and never reused while the process runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Client-computed summary of its own board after a move.
pub type BoardChecksum = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemColor {
    Red,
    Green,
    Blue,
    Yellow,
}

impl GemColor {
    pub const ALL: [GemColor; 4] = [
        GemColor::Red,
        GemColor::Green,
        GemColor::Blue,
        GemColor::Yellow,
    ];
}

/// Normal gems only sit on the board; crash gems shatter the same-colored
/// group they touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GemKind {
    Normal,
    Crash,
}

/// A single piece descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gem {
    pub color: GemColor,
    pub kind: GemKind,
}

impl Gem {
    pub const fn normal(color: GemColor) -> Self {
        Self {
            color,
            kind: GemKind::Normal,
        }
    }

    pub const fn crash(color: GemColor) -> Self {
        Self {
            color,
            kind: GemKind::Crash,
        }
    }
}

/// The pair of gems a player drops together in one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DropGroup {
    pub first: Gem,
    pub second: Gem,
}

/// A board cell. Row 0 is the top of the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub row: u8,
    pub col: u8,
}

impl Location {
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
}

/// Where the two gems of a drop group came to rest, in drop-group order.
pub type Placement = [Location; 2];
