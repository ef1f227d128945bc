// Sessions and the session registry.
//
// A `Session` is one two-player game: the two connection IDs (seated
// `First`/`Second` so each has an opponent), the punishment counter for each
// seat, the lifecycle phase, and the rules collaborator's board. Sessions are
// shared as `SharedSession` (`Arc<Mutex<Session>>`) because both players'
// connection threads act on the same one.
//
// `SessionRegistry` maps each participant's `ConnectionId` to its session,
// two entries per session. Resolving an ID with no session is a normal,
// client-triggered outcome (a stray move, or a move after the opponent left)
// and callers treat it as a no-op.
//
// Phase transitions live here; deciding who is told what lives in `turn.rs`.
// Lock order: a session's lock may be held while taking the registry lock,
// never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use gemduel_protocol::{BoardChecksum, ConnectionId, DropGroup, Placement};
use parking_lot::Mutex;

use crate::rules::{ChecksumMismatch, GameBoard};

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub fn opponent(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Paired, `session_started` not yet delivered.
    WaitingToStart,
    InProgress,
    Terminated,
}

/// Counters after a move was applied, from the mover's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppliedMove {
    pub next_pieces: DropGroup,
    pub punishment_inflicted: u32,
    pub opponent_punishment_total: u32,
    pub defeated: bool,
}

pub struct Session {
    players: [ConnectionId; 2],
    punishments: [u32; 2],
    phase: SessionPhase,
    initial_setup: [DropGroup; 2],
    board: Box<dyn GameBoard>,
}

impl Session {
    /// Seat `first` and `second` at a fresh board. The initial setup is taken
    /// from the board once, so both players are sent the same pieces.
    pub fn new(first: ConnectionId, second: ConnectionId, board: Box<dyn GameBoard>) -> Self {
        Self {
            players: [first, second],
            punishments: [0; 2],
            phase: SessionPhase::WaitingToStart,
            initial_setup: board.initial_setup(),
            board,
        }
    }

    pub fn players(&self) -> [ConnectionId; 2] {
        self.players
    }

    pub fn player(&self, seat: Seat) -> ConnectionId {
        self.players[seat.index()]
    }

    pub fn seat_of(&self, id: ConnectionId) -> Option<Seat> {
        if self.players[0] == id {
            Some(Seat::First)
        } else if self.players[1] == id {
            Some(Seat::Second)
        } else {
            None
        }
    }

    pub fn opponent_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.seat_of(id).map(|seat| self.player(seat.opponent()))
    }

    /// Running punishment total inflicted on `seat`.
    pub fn punishment(&self, seat: Seat) -> u32 {
        self.punishments[seat.index()]
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn initial_setup(&self) -> [DropGroup; 2] {
        self.initial_setup
    }

    /// `WaitingToStart -> InProgress`. Returns false if the session was not
    /// waiting (already started, or terminated before it could start).
    pub(crate) fn begin(&mut self) -> bool {
        if self.phase != SessionPhase::WaitingToStart {
            return false;
        }
        self.phase = SessionPhase::InProgress;
        true
    }

    /// Move to `Terminated`. Returns false if it already was.
    pub(crate) fn terminate(&mut self) -> bool {
        if self.phase == SessionPhase::Terminated {
            return false;
        }
        self.phase = SessionPhase::Terminated;
        true
    }

    /// Resolve a move by `seat` against the board and credit the returned
    /// punishment to the opponent. The mover's own counter is never touched.
    /// On a checksum mismatch nothing changes.
    pub(crate) fn apply_move(
        &mut self,
        seat: Seat,
        placement: &Placement,
        claimed: BoardChecksum,
    ) -> Result<AppliedMove, ChecksumMismatch> {
        let outcome = self.board.resolve_move(seat, placement, claimed)?;
        let opponent = seat.opponent().index();
        self.punishments[opponent] =
            self.punishments[opponent].saturating_add(outcome.punishment_delta);
        Ok(AppliedMove {
            next_pieces: outcome.next_pieces,
            punishment_inflicted: outcome.punishment_delta,
            opponent_punishment_total: self.punishments[opponent],
            defeated: outcome.defeated,
        })
    }
}

/// Connection ID → session, two symmetric entries per session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ConnectionId, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, id: ConnectionId, session: SharedSession) {
        self.sessions.lock().insert(id, session);
    }

    /// Bind both participants to the same session in one critical section.
    pub fn bind_pair(&self, players: [ConnectionId; 2], session: &SharedSession) {
        let mut sessions = self.sessions.lock();
        for id in players {
            sessions.insert(id, Arc::clone(session));
        }
    }

    pub fn resolve(&self, id: ConnectionId) -> Option<SharedSession> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn unbind(&self, id: ConnectionId) -> Option<SharedSession> {
        self.sessions.lock().remove(&id)
    }

    /// Unbind `id` only if it is still bound to `session`.
    pub fn unbind_session(&self, id: ConnectionId, session: &SharedSession) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(&id) {
            Some(bound) if Arc::ptr_eq(bound, session) => {
                sessions.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn is_bound(&self, id: ConnectionId) -> bool {
        self.sessions.lock().contains_key(&id)
    }

    /// Number of bound connection IDs (twice the number of live sessions).
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
