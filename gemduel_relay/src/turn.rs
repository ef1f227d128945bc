// Turn coordinator: session lifecycle and who gets told what.
//
// State machine per session: `WaitingToStart -> InProgress -> Terminated`.
//
// - `join`: pairs through the matchmaking slot. A new session is started
//   immediately: `session_started` goes to both players under the session lock,
//   and only then does the phase become `InProgress`. Moves are only processed
//   in `InProgress`, so start delivery happens-before any move.
// - `handle_move`: resolves the move through the rules board, credits the
//   punishment to the opponent, replies `next_turn` to the mover and pushes
//   `opponent_moved` to the opponent. A defeat ends the session.
// - `relay_drop_group`: forwards the mover's hovering drop group.
// - `end_session`: disconnect teardown. Unbinds both players, terminates the
//   session and tells the remaining player `no_contest`.
//
// A move or update from a connection with no session, or with a session that
// is not in progress, is a stale reference and changes nothing.

use gemduel_protocol::{ConnectionId, DropGroupUpdate, MoveRequest, ServerMessage};
use tracing::{debug, info, warn};

use crate::matchmaking::Pairing;
use crate::session::{Session, SessionPhase, SharedSession};
use crate::state::RelayState;

/// What happened to a move. Returned for logging and tests; the wire side
/// effects have already happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveDisposition {
    Applied {
        punishment_inflicted: u32,
        defeated: bool,
    },
    ChecksumMismatch,
    /// No session is bound to the mover.
    NoSession,
    /// The session has not started or is already over.
    NotInProgress,
}

/// Handle a join request from `id`.
pub fn join(state: &RelayState, id: ConnectionId) {
    let pairing = state.matchmaking.pair_or_wait(id, &state.sessions, |waiting, arrival| {
        Session::new(waiting, arrival, state.rules().new_board())
    });
    match pairing {
        Pairing::Waiting => info!(conn = %id, "waiting for an opponent"),
        Pairing::AlreadyWaiting => debug!(conn = %id, "repeated join while waiting"),
        Pairing::AlreadyInSession => debug!(conn = %id, "join ignored, already in a session"),
        Pairing::Paired(session) => {
            start_session(state, &session);
        }
    }
}

/// Deliver `session_started` to both players and move the session to
/// `InProgress`. Returns false if the session was no longer waiting to start
/// (a player disconnected in between).
pub fn start_session(state: &RelayState, shared: &SharedSession) -> bool {
    let mut session = shared.lock();
    if session.phase() != SessionPhase::WaitingToStart {
        debug!("session ended before it could start");
        return false;
    }
    let [initial_pieces, upcoming_pieces] = session.initial_setup();
    let msg = ServerMessage::SessionStarted {
        initial_pieces,
        upcoming_pieces,
    };
    for id in session.players() {
        if !state.connections.send(id, &msg) {
            debug!(conn = %id, "session_started not delivered");
        }
    }
    let [first, second] = session.players();
    info!(first = %first, second = %second, "session started");
    session.begin()
}

/// Handle a move from `id`.
pub fn handle_move(state: &RelayState, id: ConnectionId, request: &MoveRequest) -> MoveDisposition {
    let Some(shared) = state.sessions.resolve(id) else {
        debug!(conn = %id, "move without a session ignored");
        return MoveDisposition::NoSession;
    };
    let mut session = shared.lock();
    if session.phase() != SessionPhase::InProgress {
        debug!(conn = %id, phase = ?session.phase(), "move outside an active session ignored");
        return MoveDisposition::NotInProgress;
    }
    let Some(seat) = session.seat_of(id) else {
        warn!(conn = %id, "session registry entry does not list this connection");
        return MoveDisposition::NoSession;
    };
    let opponent = session.player(seat.opponent());

    let applied = match session.apply_move(seat, &request.placement, request.board_checksum) {
        Ok(applied) => applied,
        Err(mismatch) => {
            warn!(conn = %id, %mismatch, "desync, move rejected");
            state.connections.send(
                id,
                &ServerMessage::ChecksumMismatch {
                    claimed: mismatch.claimed,
                    actual: mismatch.actual,
                },
            );
            return MoveDisposition::ChecksumMismatch;
        }
    };

    debug!(
        conn = %id,
        punishment = applied.punishment_inflicted,
        opponent_total = applied.opponent_punishment_total,
        "move applied"
    );
    state.connections.send(
        id,
        &ServerMessage::NextTurn {
            next_pieces: applied.next_pieces,
            punishment_inflicted: applied.punishment_inflicted,
            opponent_punishment_total: applied.opponent_punishment_total,
            lost: applied.defeated,
        },
    );
    state.connections.send(
        opponent,
        &ServerMessage::OpponentMoved {
            placement: request.placement,
            next_pieces: applied.next_pieces,
            punishment_inflicted: applied.punishment_inflicted,
            punishment_total: applied.opponent_punishment_total,
            won: applied.defeated,
        },
    );

    if applied.defeated {
        session.terminate();
        state.sessions.unbind_session(id, &shared);
        state.sessions.unbind_session(opponent, &shared);
        info!(loser = %id, winner = %opponent, "session finished");
    }

    MoveDisposition::Applied {
        punishment_inflicted: applied.punishment_inflicted,
        defeated: applied.defeated,
    }
}

/// Forward the hovering drop group of `id` to its opponent. Returns whether
/// it was forwarded.
pub fn relay_drop_group(state: &RelayState, id: ConnectionId, update: &DropGroupUpdate) -> bool {
    let Some(shared) = state.sessions.resolve(id) else {
        return false;
    };
    let session = shared.lock();
    if session.phase() != SessionPhase::InProgress {
        return false;
    }
    let Some(opponent) = session.opponent_of(id) else {
        return false;
    };
    state.connections.send(
        opponent,
        &ServerMessage::OpponentDropGroup {
            placement: update.placement,
        },
    )
}

/// Tear down the session `id` belongs to, if any. Both registry entries are
/// removed and the opponent is told `no_contest` if the session was still
/// live. Returns whether a session was bound.
pub fn end_session(state: &RelayState, id: ConnectionId) -> bool {
    let Some(shared) = state.sessions.unbind(id) else {
        return false;
    };
    let mut session = shared.lock();
    let opponent = session.opponent_of(id);
    if let Some(opponent) = opponent {
        state.sessions.unbind_session(opponent, &shared);
    }
    if session.terminate() {
        info!(conn = %id, "session abandoned");
        if let Some(opponent) = opponent {
            state.connections.send(opponent, &ServerMessage::NoContest);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpStream;
    use std::sync::Arc;

    use gemduel_protocol::{Location, Placement};

    use super::*;
    use crate::rules::GameRules;
    use crate::session::Seat;
    use crate::testing::{GOOD_CHECKSUM, ScriptedRules, pieces, recv_server_msg, tcp_pair};

    const PLACEMENT: Placement = [Location::new(0, 0), Location::new(0, 1)];

    struct Player {
        id: ConnectionId,
        reader: BufReader<TcpStream>,
    }

    impl Player {
        fn connect(state: &RelayState) -> Self {
            let (client, server) = tcp_pair();
            let id = state.allocate_id();
            state.connections.register(id, server);
            Self {
                id,
                reader: BufReader::new(client),
            }
        }

        fn recv(&mut self) -> ServerMessage {
            recv_server_msg(&mut self.reader)
        }
    }

    fn state(rules: ScriptedRules) -> RelayState {
        RelayState::new(Arc::new(rules))
    }

    /// Two connected players, paired, with `session_started` drained.
    fn paired(state: &RelayState) -> (Player, Player) {
        let mut a = Player::connect(state);
        let mut b = Player::connect(state);
        join(state, a.id);
        join(state, b.id);
        assert!(matches!(a.recv(), ServerMessage::SessionStarted { .. }));
        assert!(matches!(b.recv(), ServerMessage::SessionStarted { .. }));
        (a, b)
    }

    fn move_request(board_checksum: u64) -> MoveRequest {
        MoveRequest {
            placement: PLACEMENT,
            board_checksum,
        }
    }

    #[test]
    fn pairing_sends_identical_session_started() {
        let state = state(ScriptedRules::punishing(0));
        let mut a = Player::connect(&state);
        let mut b = Player::connect(&state);

        join(&state, a.id);
        assert_eq!(state.matchmaking.waiting(), Some(a.id));
        join(&state, b.id);

        let expected = ServerMessage::SessionStarted {
            initial_pieces: pieces(0),
            upcoming_pieces: pieces(1),
        };
        assert_eq!(a.recv(), expected);
        assert_eq!(b.recv(), expected);
        assert_eq!(state.matchmaking.waiting(), None);

        let session = state.sessions.resolve(a.id).unwrap();
        assert_eq!(session.lock().phase(), SessionPhase::InProgress);
        assert!(Arc::ptr_eq(&session, &state.sessions.resolve(b.id).unwrap()));
    }

    #[test]
    fn move_replies_next_turn_and_pushes_opponent_update() {
        let state = state(ScriptedRules::punishing(2));
        let (mut a, mut b) = paired(&state);

        let disposition = handle_move(&state, b.id, &move_request(GOOD_CHECKSUM));
        assert_eq!(
            disposition,
            MoveDisposition::Applied {
                punishment_inflicted: 2,
                defeated: false,
            }
        );

        assert_eq!(
            b.recv(),
            ServerMessage::NextTurn {
                next_pieces: pieces(2),
                punishment_inflicted: 2,
                opponent_punishment_total: 2,
                lost: false,
            }
        );
        assert_eq!(
            a.recv(),
            ServerMessage::OpponentMoved {
                placement: PLACEMENT,
                next_pieces: pieces(2),
                punishment_inflicted: 2,
                punishment_total: 2,
                won: false,
            }
        );

        let session = state.sessions.resolve(a.id).unwrap();
        let session = session.lock();
        assert_eq!(session.punishment(Seat::First), 2);
        assert_eq!(session.punishment(Seat::Second), 0);
    }

    #[test]
    fn opponent_total_reflects_unchanged_counter_when_no_punishment() {
        let state = state(ScriptedRules::punishing(0));
        let (_a, mut b) = paired(&state);

        handle_move(&state, b.id, &move_request(GOOD_CHECKSUM));
        match b.recv() {
            ServerMessage::NextTurn {
                punishment_inflicted,
                opponent_punishment_total,
                ..
            } => {
                assert_eq!(punishment_inflicted, 0);
                assert_eq!(opponent_punishment_total, 0);
            }
            other => panic!("expected NextTurn, got {other:?}"),
        }
    }

    #[test]
    fn checksum_mismatch_is_reported_and_changes_nothing() {
        let state = state(ScriptedRules::punishing(4));
        let (mut a, mut b) = paired(&state);

        let disposition = handle_move(&state, a.id, &move_request(0xBAD));
        assert_eq!(disposition, MoveDisposition::ChecksumMismatch);
        assert_eq!(
            a.recv(),
            ServerMessage::ChecksumMismatch {
                claimed: 0xBAD,
                actual: GOOD_CHECKSUM,
            }
        );

        let session = state.sessions.resolve(a.id).unwrap();
        assert_eq!(session.lock().punishment(Seat::First), 0);
        assert_eq!(session.lock().punishment(Seat::Second), 0);

        // The opponent heard nothing; the next thing it sees is a real move.
        handle_move(&state, a.id, &move_request(GOOD_CHECKSUM));
        assert!(matches!(b.recv(), ServerMessage::OpponentMoved { .. }));
    }

    #[test]
    fn move_without_session_is_a_no_op() {
        let state = state(ScriptedRules::punishing(1));
        let loner = Player::connect(&state);
        join(&state, loner.id);

        let disposition = handle_move(&state, loner.id, &move_request(GOOD_CHECKSUM));
        assert_eq!(disposition, MoveDisposition::NoSession);
        assert_eq!(state.matchmaking.waiting(), Some(loner.id));
        assert!(state.sessions.is_empty());
    }

    #[test]
    fn move_before_start_is_ignored() {
        let rules = ScriptedRules::punishing(1);
        let state = state(rules.clone());
        let a = Player::connect(&state);
        let b = Player::connect(&state);
        let pairing = state.matchmaking.pair_or_wait(a.id, &state.sessions, |_, _| {
            unreachable!("first join never builds a session")
        });
        assert!(matches!(pairing, Pairing::Waiting));
        let Pairing::Paired(shared) = state.matchmaking.pair_or_wait(b.id, &state.sessions, |w, n| {
            Session::new(w, n, rules.new_board())
        }) else {
            panic!("expected pairing");
        };

        // Bound but not yet started.
        let disposition = handle_move(&state, a.id, &move_request(GOOD_CHECKSUM));
        assert_eq!(disposition, MoveDisposition::NotInProgress);
        assert_eq!(shared.lock().punishment(Seat::Second), 0);
    }

    #[test]
    fn disconnect_tears_down_both_entries_and_notifies_opponent() {
        let state = state(ScriptedRules::punishing(1));
        let (a, mut b) = paired(&state);

        assert!(end_session(&state, a.id));
        assert!(!state.sessions.is_bound(a.id));
        assert!(!state.sessions.is_bound(b.id));
        assert_eq!(b.recv(), ServerMessage::NoContest);

        // The survivor's next move is a stale reference.
        let disposition = handle_move(&state, b.id, &move_request(GOOD_CHECKSUM));
        assert_eq!(disposition, MoveDisposition::NoSession);
        assert!(!end_session(&state, b.id));
    }

    #[test]
    fn session_abandoned_before_start_never_starts() {
        let state = state(ScriptedRules::punishing(0));
        let a = Player::connect(&state);
        let b = Player::connect(&state);
        join(&state, a.id);
        let rules = ScriptedRules::punishing(0);
        let Pairing::Paired(shared) = state.matchmaking.pair_or_wait(b.id, &state.sessions, |w, n| {
            Session::new(w, n, rules.new_board())
        }) else {
            panic!("expected pairing");
        };

        end_session(&state, a.id);
        assert!(!start_session(&state, &shared));
        assert_eq!(shared.lock().phase(), SessionPhase::Terminated);
    }

    #[test]
    fn defeat_ends_session_for_both() {
        let state = state(ScriptedRules::punishing(1).defeat_on_move(2));
        let (mut a, mut b) = paired(&state);

        handle_move(&state, a.id, &move_request(GOOD_CHECKSUM));
        let _ = a.recv();
        let _ = b.recv();

        let disposition = handle_move(&state, a.id, &move_request(GOOD_CHECKSUM));
        assert_eq!(
            disposition,
            MoveDisposition::Applied {
                punishment_inflicted: 1,
                defeated: true,
            }
        );
        assert!(matches!(a.recv(), ServerMessage::NextTurn { lost: true, .. }));
        assert!(matches!(b.recv(), ServerMessage::OpponentMoved { won: true, .. }));
        assert!(state.sessions.is_empty());

        // Both can queue up again.
        join(&state, b.id);
        assert_eq!(state.matchmaking.waiting(), Some(b.id));
    }

    #[test]
    fn drop_group_update_goes_to_opponent_only() {
        let state = state(ScriptedRules::punishing(0));
        let (mut a, b) = paired(&state);
        let update = DropGroupUpdate {
            placement: [Location::new(3, 3), Location::new(2, 3)],
        };

        assert!(relay_drop_group(&state, b.id, &update));
        assert_eq!(
            a.recv(),
            ServerMessage::OpponentDropGroup {
                placement: update.placement,
            }
        );
    }

    #[test]
    fn drop_group_update_without_session_is_dropped() {
        let state = state(ScriptedRules::punishing(0));
        let loner = Player::connect(&state);
        let update = DropGroupUpdate {
            placement: [Location::new(3, 3), Location::new(2, 3)],
        };
        assert!(!relay_drop_group(&state, loner.id, &update));
    }
}
