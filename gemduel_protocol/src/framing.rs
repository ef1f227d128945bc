// Length-delimited framing over a byte stream.
//
// Each frame is a 4-byte big-endian length followed by that many bytes of
// JSON. Framing is format-agnostic: `read_frame` hands back raw bytes and the
// caller decides how to decode them (see `codec.rs`), so a frame that fails
// to parse stays a recoverable, per-message problem while anything wrong at
// this layer is a transport failure.
//
// Duel messages are small; `MAX_FRAME_LEN` bounds the allocation a hostile
// length prefix can force.

use std::io::{self, Read, Write};

use serde::Serialize;
use thiserror::Error;

/// Largest accepted frame body (64 KiB).
pub const MAX_FRAME_LEN: u32 = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge { len: usize },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FrameError {
    /// True when the peer closed the stream between frames or mid-frame.
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
    }
}

/// Write one frame and flush it.
pub fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<(), FrameError> {
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or(FrameError::TooLarge { len: body.len() })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame body. A clean close before the length prefix surfaces as
/// an `UnexpectedEof` I/O error, like a close mid-frame.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len: len as usize });
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body)?;
    Ok(body)
}

/// Serialize `msg` as JSON and write it as one frame.
pub fn write_json<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> Result<(), FrameError> {
    let body = serde_json::to_vec(msg)?;
    write_frame(writer, &body)
}
