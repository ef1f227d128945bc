// Envelope decoding and encoding.
//
// Decoding is two-stage: first the envelope (`kind` + raw `payload`), then the
// payload against the shape for that kind. This separates the three outcomes
// the relay treats differently:
// - a known message (`Decoded::Message`),
// - an unknown kind (`Decoded::Unknown`, skipped by the relay),
// - a malformed frame (`DecodeError`, reported back to the sender).

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::message::{ClientMessage, ServerMessage, kind};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Result of decoding one inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Message(ClientMessage),
    /// Well-formed envelope with a kind this relay does not know.
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Decode one inbound frame.
pub fn decode(raw: &[u8]) -> Result<Decoded, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(raw).map_err(DecodeError::Envelope)?;
    let message = match envelope.kind.as_str() {
        kind::JOIN => ClientMessage::Join,
        kind::MOVE => ClientMessage::Move(payload(kind::MOVE, envelope.payload)?),
        kind::DROP_GROUP_UPDATE => {
            ClientMessage::DropGroupUpdate(payload(kind::DROP_GROUP_UPDATE, envelope.payload)?)
        }
        _ => return Ok(Decoded::Unknown(envelope.kind)),
    };
    Ok(Decoded::Message(message))
}

fn payload<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
}

/// Encode an outbound message into its JSON envelope. The message types have
/// no map keys or custom serializers, so this only fails if serde_json itself
/// does.
pub fn encode(msg: &ServerMessage) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(msg)
}
