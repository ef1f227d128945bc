// Shared relay state.
//
// `RelayState` is the one context object every connection thread receives: the
// connection-ID counter, the two registries, the matchmaking slot, and the
// rules collaborator. It is built by `server::start_relay` and shared by
// `Arc`; there is no process-global state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gemduel_protocol::ConnectionId;

use crate::connections::ConnectionRegistry;
use crate::matchmaking::MatchmakingQueue;
use crate::rules::GameRules;
use crate::session::SessionRegistry;

pub struct RelayState {
    next_connection_id: AtomicU64,
    pub connections: ConnectionRegistry,
    pub sessions: SessionRegistry,
    pub matchmaking: MatchmakingQueue,
    rules: Arc<dyn GameRules>,
}

impl RelayState {
    pub fn new(rules: Arc<dyn GameRules>) -> Self {
        Self {
            next_connection_id: AtomicU64::new(1),
            connections: ConnectionRegistry::new(),
            sessions: SessionRegistry::new(),
            matchmaking: MatchmakingQueue::new(),
            rules,
        }
    }

    /// Next connection ID. IDs are never handed out twice.
    pub fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn rules(&self) -> &dyn GameRules {
        self.rules.as_ref()
    }
}
