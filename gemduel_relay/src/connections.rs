// Connection registry: connection ID → outbound half of its TCP stream.
//
// The connection handler registers the write half on connect and unregisters
// it on teardown; everything else only sends. Sending is lookup-and-write
// under the registry lock, so a send can never race a teardown of the same
// entry. Streams carry a write timeout (set by the server), which bounds how
// long a stalled peer can hold the lock.
//
// A send to an absent ID, or one whose write fails, returns `false`. Callers
// that notify an opponent treat that as "nobody to tell". A failed write may
// have left a partial frame on the wire, so the entry is removed and the
// socket shut down on the spot; the connection's reader then sees EOF and
// runs the usual teardown.

use std::collections::HashMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};

use gemduel_protocol::{ConnectionId, ServerMessage, encode, write_frame};
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, BufWriter<TcpStream>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnectionId, stream: TcpStream) {
        self.connections.lock().insert(id, BufWriter::new(stream));
    }

    /// Remove the entry and drop its write half. Returns false if it was
    /// already gone.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode and write `msg` to `id`. Returns whether it was written.
    pub fn send(&self, id: ConnectionId, msg: &ServerMessage) -> bool {
        let body = match encode(msg) {
            Ok(body) => body,
            Err(e) => {
                debug!(conn = %id, error = %e, "failed to encode message");
                return false;
            }
        };
        let mut connections = self.connections.lock();
        let Some(writer) = connections.get_mut(&id) else {
            debug!(conn = %id, "send to unregistered connection skipped");
            return false;
        };
        match write_frame(writer, &body) {
            Ok(()) => true,
            Err(e) => {
                warn!(conn = %id, error = %e, "write failed, dropping connection");
                if let Some(writer) = connections.remove(&id) {
                    // Unflushed bytes are discarded with the connection.
                    let (stream, _) = writer.into_parts();
                    if let Err(e) = stream.shutdown(Shutdown::Both) {
                        debug!(conn = %id, error = %e, "shutdown failed");
                    }
                }
                false
            }
        }
    }

    /// Shut down every registered stream in both directions. Each
    /// connection's reader then sees EOF and runs its own teardown.
    pub fn shutdown_all(&self) {
        for (id, writer) in self.connections.lock().iter() {
            if let Err(e) = writer.get_ref().shutdown(Shutdown::Both) {
                debug!(conn = %id, error = %e, "shutdown failed");
            }
        }
    }
}
