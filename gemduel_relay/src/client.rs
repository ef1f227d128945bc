// TCP client for talking to the relay.
//
// Architecture:
// - `connect()` opens the TCP stream on the calling thread and spawns a
//   background reader thread.
// - The reader thread calls `read_frame()` in a loop, deserializes
//   `ServerMessage`, and pushes into an `mpsc` channel. It exits on EOF, on a
//   transport error, or on a frame that does not parse.
// - The caller holds a `BufWriter<TcpStream>` for sending. Dropping the
//   client shuts the socket down, which also ends the reader thread.
// - `poll()` drains the inbox without blocking; `recv_timeout()` waits for
//   the next message.
//
// The client has no game logic. It is used by the integration tests and is
// small enough for a game front end to embed.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gemduel_protocol::{
    BoardChecksum, ClientMessage, DropGroupUpdate, MoveRequest, Placement, ServerMessage,
    read_frame, write_frame, write_json,
};
use tracing::debug;

use crate::error::ClientError;

pub struct DuelClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: JoinHandle<()>,
}

impl DuelClient {
    /// Connect to a relay and start the reader thread.
    pub fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream =
            TcpStream::connect(addr).map_err(|source| ClientError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Self {
            writer: BufWriter::new(stream),
            inbox: rx,
            _reader_thread: reader_thread,
        })
    }

    /// Ask to be paired with the next player who joins.
    pub fn join(&mut self) -> Result<(), ClientError> {
        self.send(&ClientMessage::Join)
    }

    pub fn send_move(
        &mut self,
        placement: Placement,
        board_checksum: BoardChecksum,
    ) -> Result<(), ClientError> {
        self.send(&ClientMessage::Move(MoveRequest {
            placement,
            board_checksum,
        }))
    }

    /// Share where our drop group currently hovers.
    pub fn send_drop_group_update(&mut self, placement: Placement) -> Result<(), ClientError> {
        self.send(&ClientMessage::DropGroupUpdate(DropGroupUpdate { placement }))
    }

    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), ClientError> {
        write_json(&mut self.writer, msg)?;
        Ok(())
    }

    /// Send an arbitrary frame body, bypassing message encoding.
    pub fn send_raw(&mut self, body: &[u8]) -> Result<(), ClientError> {
        write_frame(&mut self.writer, body)?;
        Ok(())
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        self.inbox.try_iter().collect()
    }

    /// Wait up to `timeout` for the next server message. `Ok(None)` means
    /// nothing arrived in time; `Closed` means the reader thread has exited
    /// and nothing more will arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ServerMessage>, ClientError> {
        match self.inbox.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ClientError::Closed),
        }
    }
}

impl Drop for DuelClient {
    /// The reader thread holds a clone of the stream, so shut the socket down
    /// explicitly; the relay then sees EOF and the reader thread exits.
    fn drop(&mut self) {
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    loop {
        let body = match read_frame(&mut reader) {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "client reader stopped");
                break;
            }
        };
        match serde_json::from_slice::<ServerMessage>(&body) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Client dropped
                }
            }
            Err(e) => {
                debug!(error = %e, "unparseable server message");
                break;
            }
        }
    }
}
