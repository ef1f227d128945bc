// gemduel_relay: two-player matchmaking and turn relay for Gem Duel.
//
// Clients connect over TCP, ask to join, and are paired two at a time into
// sessions. During a session each player submits moves with a checksum of its
// own board; the relay resolves the move through a rules collaborator,
// credits punishment to the opponent, and tells both players what happened.
// Game logic lives behind the `GameRules` trait; `gems.rs` is the reference
// implementation the binary runs with.
//
// Module overview:
// - `server.rs`:      TCP listener, one thread per connection, shutdown.
// - `handler.rs`:     Per-connection receive/decode/dispatch loop and
//                     disconnect teardown.
// - `turn.rs`:        Session start, move handling, drop-group relay, and
//                     ending a session.
// - `matchmaking.rs`: The single waiting slot and atomic pairing.
// - `session.rs`:     `Session` (players, punishments, phase) and the
//                     connection-to-session registry.
// - `connections.rs`: Connection ID to outbound stream; all sends go here.
// - `state.rs`:       `RelayState`, the shared context passed to every thread.
// - `rules.rs`:       The rules collaborator traits.
// - `gems.rs`:        Reference falling-gem rules.
// - `client.rs`:      A small blocking client with a reader thread.
//
// Lock order, outermost first: matchmaking slot, session, session registry,
// connection registry.

pub mod client;
pub mod connections;
pub mod error;
pub mod gems;
pub mod handler;
pub mod matchmaking;
pub mod rules;
pub mod server;
pub mod session;
pub mod state;
pub mod turn;

#[cfg(test)]
mod testing;

pub use client::DuelClient;
pub use error::{ClientError, RelayError};
pub use gems::GemRules;
pub use rules::{ChecksumMismatch, GameBoard, GameRules, MoveOutcome};
pub use server::{RelayConfig, RelayHandle, start_relay, start_relay_with_rules};
pub use session::Seat;
