// Shared unit-test helpers: loopback TCP pairs and a scripted rules board
// whose punishment, checksum, and defeat point are fixed up front.

use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use gemduel_protocol::{
    BoardChecksum, DropGroup, Gem, GemColor, Placement, ServerMessage, read_frame,
};

use crate::rules::{ChecksumMismatch, GameBoard, GameRules, MoveOutcome};
use crate::session::Seat;

/// The only checksum a `ScriptedBoard` accepts.
pub const GOOD_CHECKSUM: BoardChecksum = 0xC0FF_EE00;

/// Create a TCP pair: (client_stream, server_stream) on localhost.
pub fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

/// Read one ServerMessage from a framed stream.
pub fn recv_server_msg(reader: &mut BufReader<TcpStream>) -> ServerMessage {
    let body = read_frame(reader).unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// The n-th drop group a scripted board deals.
pub fn pieces(n: u32) -> DropGroup {
    let color = GemColor::ALL[n as usize % GemColor::ALL.len()];
    DropGroup {
        first: Gem::normal(color),
        second: if n % 3 == 2 {
            Gem::crash(color)
        } else {
            Gem::normal(color)
        },
    }
}

#[derive(Clone)]
pub struct ScriptedRules {
    punishment: u32,
    defeat_on_move: Option<u32>,
}

impl ScriptedRules {
    /// Every accepted move inflicts `punishment`.
    pub fn punishing(punishment: u32) -> Self {
        Self {
            punishment,
            defeat_on_move: None,
        }
    }

    /// The n-th accepted move on a board (counting both seats) loses.
    pub fn defeat_on_move(mut self, n: u32) -> Self {
        self.defeat_on_move = Some(n);
        self
    }
}

impl GameRules for ScriptedRules {
    fn new_board(&self) -> Box<dyn GameBoard> {
        Box::new(ScriptedBoard {
            rules: self.clone(),
            moves: 0,
        })
    }
}

struct ScriptedBoard {
    rules: ScriptedRules,
    moves: u32,
}

impl GameBoard for ScriptedBoard {
    fn initial_setup(&self) -> [DropGroup; 2] {
        [pieces(0), pieces(1)]
    }

    fn resolve_move(
        &mut self,
        _seat: Seat,
        _placement: &Placement,
        claimed: BoardChecksum,
    ) -> Result<MoveOutcome, ChecksumMismatch> {
        if claimed != GOOD_CHECKSUM {
            return Err(ChecksumMismatch {
                claimed,
                actual: GOOD_CHECKSUM,
            });
        }
        self.moves += 1;
        Ok(MoveOutcome {
            next_pieces: pieces(self.moves + 1),
            punishment_delta: self.rules.punishment,
            defeated: self.rules.defeat_on_move == Some(self.moves),
        })
    }
}
