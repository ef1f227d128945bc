// gemduel_protocol: wire protocol between duel clients and the matchmaking relay.
//
// Shared by the relay (`gemduel_relay`) and any client implementation. It has
// no knowledge of sessions, matchmaking, or game rules.
//
// Module overview:
// - `types.rs`:    `ConnectionId`, the piece model (`Gem`, `DropGroup`) and
//                  board coordinates (`Location`, `Placement`).
// - `message.rs`:  `ClientMessage` / `ServerMessage` envelopes.
// - `codec.rs`:    Two-stage decoding that separates unknown kinds from
//                  malformed payloads; encoding of server messages.
// - `framing.rs`:  4-byte big-endian length prefix + JSON body over any
//                  `Read`/`Write` stream.
//
// Design decisions:
// - **JSON envelopes.** `{ "kind": ..., "payload": ... }`, easy to produce
//   from a browser or script client.
// - **No async runtime.** Framing works on `std::io` streams so the relay can
//   run a plain thread per connection.

pub mod codec;
pub mod framing;
pub mod message;
pub mod types;

pub use codec::{DecodeError, Decoded, decode, encode};
pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame, write_json};
pub use message::{ClientMessage, DropGroupUpdate, MoveRequest, ServerMessage};
pub use types::{
    BoardChecksum, ConnectionId, DropGroup, Gem, GemColor, GemKind, Location, Placement,
};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn pieces() -> DropGroup {
        DropGroup {
            first: Gem::normal(GemColor::Green),
            second: Gem::crash(GemColor::Yellow),
        }
    }

    /// Frame a server message, read it back, and parse it as a client would.
    fn over_the_wire(msg: &ServerMessage) -> ServerMessage {
        let mut wire = Vec::new();
        write_frame(&mut wire, &encode(msg).unwrap()).unwrap();
        let body = read_frame(&mut Cursor::new(wire)).unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn session_started_reaches_client_intact() {
        let msg = ServerMessage::SessionStarted {
            initial_pieces: pieces(),
            upcoming_pieces: DropGroup {
                first: Gem::normal(GemColor::Red),
                second: Gem::normal(GemColor::Red),
            },
        };
        assert_eq!(over_the_wire(&msg), msg);
    }

    #[test]
    fn opponent_moved_reaches_client_intact() {
        let msg = ServerMessage::OpponentMoved {
            placement: [Location::new(12, 0), Location::new(11, 0)],
            next_pieces: pieces(),
            punishment_inflicted: 4,
            punishment_total: 9,
            won: true,
        };
        assert_eq!(over_the_wire(&msg), msg);
    }

    #[test]
    fn client_frame_decodes_on_the_relay_side() {
        let mut wire = Vec::new();
        write_json(&mut wire, &ClientMessage::Join).unwrap();
        let body = read_frame(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decode(&body).unwrap(), Decoded::Message(ClientMessage::Join));
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId(17).to_string(), "#17");
    }
}
