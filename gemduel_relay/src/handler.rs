// Per-connection control loop.
//
// `serve_connection` runs on its own thread for the whole life of one client:
// allocate an ID, register the write half, then receive → decode → dispatch
// until the transport fails.
//
// Failure handling:
// - Malformed frame (bad JSON, bad payload shape): reply `error`, keep going.
// - Unknown message kind: log and skip.
// - Transport failure (EOF, I/O error, oversized frame): leave the loop.
//
// Teardown is done by `ConnectionGuard::drop`, so it runs on every exit
// path, including a panic in a dispatch: the waiting slot is released, the
// session (if any) is ended for both players, and the connection is
// unregistered.

use std::io::BufReader;
use std::net::TcpStream;

use gemduel_protocol::{ClientMessage, ConnectionId, Decoded, ServerMessage, decode, read_frame};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::state::RelayState;
use crate::turn;

/// Serve one client connection until it closes.
pub fn serve_connection(state: &RelayState, stream: TcpStream) -> Result<(), RelayError> {
    let write_half = stream.try_clone()?;
    let id = state.allocate_id();
    state.connections.register(id, write_half);
    let _guard = ConnectionGuard { state, id };
    info!(conn = %id, peer = ?stream.peer_addr().ok(), "connected");

    let mut reader = BufReader::new(stream);
    loop {
        let frame = match read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(e) if e.is_eof() => {
                debug!(conn = %id, "closed by peer");
                break;
            }
            Err(e) => {
                warn!(conn = %id, error = %e, "transport failure");
                break;
            }
        };
        match decode(&frame) {
            Ok(Decoded::Message(message)) => dispatch(state, id, message),
            Ok(Decoded::Unknown(kind)) => {
                debug!(conn = %id, kind = %kind, "unknown message kind skipped");
            }
            Err(e) => {
                debug!(conn = %id, error = %e, "malformed message");
                state.connections.send(
                    id,
                    &ServerMessage::Error {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }
    Ok(())
}

fn dispatch(state: &RelayState, id: ConnectionId, message: ClientMessage) {
    match message {
        ClientMessage::Join => turn::join(state, id),
        ClientMessage::Move(request) => {
            let disposition = turn::handle_move(state, id, &request);
            debug!(conn = %id, ?disposition, "move handled");
        }
        ClientMessage::DropGroupUpdate(update) => {
            turn::relay_drop_group(state, id, &update);
        }
    }
}

/// Releases everything a connection holds when dropped.
struct ConnectionGuard<'a> {
    state: &'a RelayState,
    id: ConnectionId,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        let id = self.id;
        if self.state.matchmaking.cancel(id) {
            debug!(conn = %id, "left the waiting slot");
        }
        turn::end_session(self.state, id);
        self.state.connections.unregister(id);
        info!(conn = %id, "disconnected");
    }
}
