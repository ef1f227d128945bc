// Protocol messages for client-relay communication.
//
// Every message travels as an envelope `{ "kind": <tag>, "payload": <object> }`.
// The two enums below are the full vocabulary:
// - `ClientMessage`: sent by players to the relay.
// - `ServerMessage`: sent by the relay to players.
//
// Both are serde adjacently-tagged enums, so the derived encoding is the wire
// envelope itself. Decoding of client messages goes through `codec::decode`
// rather than the derived `Deserialize`, because unknown kinds must be told
// apart from malformed payloads.

use serde::{Deserialize, Serialize};

use crate::types::{BoardChecksum, DropGroup, Placement};

/// Envelope tags, shared by the encoder and the decoder.
pub mod kind {
    pub const JOIN: &str = "join";
    pub const MOVE: &str = "move";
    pub const DROP_GROUP_UPDATE: &str = "drop_group_update";
}

/// Payload of a `move`: where the drop group landed and the client's board
/// checksum after landing it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub placement: Placement,
    pub board_checksum: BoardChecksum,
}

/// Payload of a `drop_group_update`: live position of the falling drop group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DropGroupUpdate {
    pub placement: Placement,
}

/// Messages sent by a client to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to be paired with an opponent.
    Join,
    /// A completed drop.
    Move(MoveRequest),
    /// Where the current drop group is hovering, relayed to the opponent.
    DropGroupUpdate(DropGroupUpdate),
}

/// Messages sent by the relay to a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A session was formed. Both players receive the same pieces.
    SessionStarted {
        initial_pieces: DropGroup,
        upcoming_pieces: DropGroup,
    },
    /// Reply to the mover after a successful move.
    NextTurn {
        next_pieces: DropGroup,
        punishment_inflicted: u32,
        opponent_punishment_total: u32,
        lost: bool,
    },
    /// Pushed to the other player after a successful move.
    OpponentMoved {
        placement: Placement,
        next_pieces: DropGroup,
        punishment_inflicted: u32,
        /// The receiving player's own running punishment total.
        punishment_total: u32,
        won: bool,
    },
    /// The opponent's drop group moved.
    OpponentDropGroup { placement: Placement },
    /// The opponent left; the session is over without a result.
    NoContest,
    /// The move's checksum disagreed with the relay's board. Nothing was
    /// applied.
    ChecksumMismatch {
        claimed: BoardChecksum,
        actual: BoardChecksum,
    },
    /// The last message could not be parsed.
    Error { reason: String },
}
