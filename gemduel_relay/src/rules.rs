// The game-rules collaborator as the relay sees it.
//
// The relay never interprets boards or scoring. It asks a `GameRules`
// implementation for one `GameBoard` per session, takes the initial drop
// groups from it, and hands every move to `GameBoard::resolve_move`. The
// board answers with the mover's next drop group, the punishment the move
// inflicted on the opponent, and whether the mover has lost, or with a
// `ChecksumMismatch` when the client's board and the board held here
// disagree.
//
// `gems.rs` is the reference implementation used by the `relay` binary.

use gemduel_protocol::{BoardChecksum, DropGroup, Placement};
use thiserror::Error;

use crate::session::Seat;

/// What a successfully resolved move produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    /// The drop group the mover will see as "next" after this move.
    pub next_pieces: DropGroup,
    /// Punishment inflicted on the mover's opponent.
    pub punishment_delta: u32,
    /// The move left the mover's board in a losing state.
    pub defeated: bool,
}

/// The claimed board checksum does not match the board held for the mover.
/// The board must be left exactly as it was before the move.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("board checksum mismatch: client claimed {claimed:#x}, relay holds {actual:#x}")]
pub struct ChecksumMismatch {
    pub claimed: BoardChecksum,
    pub actual: BoardChecksum,
}

/// Per-session game state.
pub trait GameBoard: Send {
    /// Current and upcoming drop group, identical for both seats.
    fn initial_setup(&self) -> [DropGroup; 2];

    fn resolve_move(
        &mut self,
        seat: Seat,
        placement: &Placement,
        claimed: BoardChecksum,
    ) -> Result<MoveOutcome, ChecksumMismatch>;
}

/// Factory for per-session boards. Shared by every connection thread.
pub trait GameRules: Send + Sync {
    fn new_board(&self) -> Box<dyn GameBoard>;
}
