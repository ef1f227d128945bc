// Matchmaking: a single waiting slot.
//
// `pair_or_wait` is the only way a session comes into existence. Checking the
// slot, clearing it, constructing the session, and binding both players in the
// session registry all happen while the slot lock is held, so two simultaneous
// joins can neither both become the waiter nor both pair with the same waiter,
// and the waiting ID is never visible in the session registry.
//
// Depth is one: there is no queue behind the slot.

use std::sync::Arc;

use gemduel_protocol::ConnectionId;
use parking_lot::Mutex;

use crate::session::{Session, SessionRegistry, SharedSession};

/// Result of a join request.
pub enum Pairing {
    /// The caller is now the waiting player.
    Waiting,
    /// The caller was already the waiting player; nothing changed.
    AlreadyWaiting,
    /// The caller is already in a session; the join is ignored.
    AlreadyInSession,
    /// The caller was paired with the waiting player.
    Paired(SharedSession),
}

#[derive(Default)]
pub struct MatchmakingQueue {
    waiting: Mutex<Option<ConnectionId>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `id` with the waiting player, or make `id` the waiting player.
    ///
    /// On pairing, `new_session(waiting, id)` builds the session, which is
    /// then bound under both IDs before the slot lock is released.
    pub fn pair_or_wait<F>(
        &self,
        id: ConnectionId,
        sessions: &SessionRegistry,
        new_session: F,
    ) -> Pairing
    where
        F: FnOnce(ConnectionId, ConnectionId) -> Session,
    {
        let mut waiting = self.waiting.lock();
        if sessions.is_bound(id) {
            return Pairing::AlreadyInSession;
        }
        match *waiting {
            None => {
                *waiting = Some(id);
                Pairing::Waiting
            }
            Some(other) if other == id => Pairing::AlreadyWaiting,
            Some(other) => {
                *waiting = None;
                let session = Arc::new(Mutex::new(new_session(other, id)));
                sessions.bind_pair([other, id], &session);
                Pairing::Paired(session)
            }
        }
    }

    /// Clear the slot if `id` holds it. Returns whether it did.
    pub fn cancel(&self, id: ConnectionId) -> bool {
        let mut waiting = self.waiting.lock();
        if *waiting == Some(id) {
            *waiting = None;
            true
        } else {
            false
        }
    }

    pub fn waiting(&self) -> Option<ConnectionId> {
        *self.waiting.lock()
    }
}
