// TCP listener and per-connection threads for the relay.
//
// Architecture: thread-per-connection over shared, lock-protected state.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and spawns one connection thread per client. The listener is
//   non-blocking so the loop can check `keep_running` between accepts.
// - **Connection threads**: each runs `handler::serve_connection`, which owns
//   the read half of its stream for the connection's whole life. Writes to any
//   client go through `ConnectionRegistry`, so a thread handling one player's
//   move can push to the opponent directly.
//
// Nothing here is global: all shared state lives in one `RelayState` behind
// an `Arc`, created per `start_relay` call. Tests start several relays side
// by side on port 0.
//
// Shutdown: `RelayHandle::stop` clears `keep_running` (the listener exits
// within one poll interval) and shuts down every registered stream, so each
// connection thread sees EOF and runs its normal teardown.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::gems::GemRules;
use crate::handler::serve_connection;
use crate::rules::GameRules;
use crate::state::RelayState;

/// How long the listener sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for starting a relay server.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_address: IpAddr,
    /// Port 0 lets the OS pick a free port; see the address `start_relay`
    /// returns.
    pub port: u16,
    /// Seed for the reference rules. `None` draws one at startup.
    pub rules_seed: Option<u64>,
    /// Upper bound on a single write to a client. A peer that stops reading
    /// cannot stall the relay for longer than this.
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3030,
            rules_seed: None,
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl RelayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    state: Arc<RelayState>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop, disconnect every client, and wait for the
    /// listener to exit.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.state.connections.shutdown_all();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    /// Block until the listener exits, which only happens on a fatal accept
    /// error.
    pub fn wait(mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }
}

/// Start the relay with the reference gem rules on a background thread.
/// Returns a handle for stopping it and the actual bound address.
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let seed = config.rules_seed.unwrap_or_else(rand::random);
    info!(seed, "reference rules seeded");
    start_relay_with_rules(config, Arc::new(GemRules::new(seed)))
}

/// Start the relay with a caller-supplied rules collaborator.
pub fn start_relay_with_rules(
    config: RelayConfig,
    rules: Arc<dyn GameRules>,
) -> Result<(RelayHandle, SocketAddr), RelayError> {
    let requested = config.socket_addr();
    let listener = TcpListener::bind(requested).map_err(|source| RelayError::Bind {
        addr: requested,
        source,
    })?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let state = Arc::new(RelayState::new(rules));
    let keep_running = Arc::new(AtomicBool::new(true));

    let thread = {
        let state = Arc::clone(&state);
        let keep_running = Arc::clone(&keep_running);
        let write_timeout = config.write_timeout;
        thread::Builder::new()
            .name("relay-listener".into())
            .spawn(move || accept_loop(listener, state, keep_running, write_timeout))?
    };
    info!(%addr, "relay listening");

    Ok((
        RelayHandle {
            keep_running,
            state,
            thread: Some(thread),
        },
        addr,
    ))
}

fn accept_loop(
    listener: TcpListener,
    state: Arc<RelayState>,
    keep_running: Arc<AtomicBool>,
    write_timeout: Duration,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted");
                let state = Arc::clone(&state);
                let spawned = thread::Builder::new()
                    .name(format!("relay-conn-{peer}"))
                    .spawn(move || run_connection(&state, stream, write_timeout));
                if let Err(e) = spawned {
                    warn!(%peer, error = %e, "could not spawn connection thread");
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!(error = %e, "accept failed, listener stopping");
                break;
            }
        }
    }
    debug!("listener stopped");
}

fn run_connection(state: &RelayState, stream: TcpStream, write_timeout: Duration) {
    let prepared = stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_write_timeout(Some(write_timeout)))
        .and_then(|()| stream.set_nodelay(true));
    if let Err(e) = prepared {
        warn!(error = %e, "could not configure stream, dropping connection");
        return;
    }
    if let Err(e) = serve_connection(state, stream) {
        warn!(error = %e, "connection ended with an error");
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::time::Instant;

    use gemduel_protocol::{ClientMessage, ServerMessage, write_json};

    use super::*;
    use crate::testing::{ScriptedRules, recv_server_msg};

    fn local_config() -> RelayConfig {
        RelayConfig {
            port: 0,
            ..RelayConfig::default()
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn default_config_listens_on_localhost_3030() {
        let config = RelayConfig::default();
        assert_eq!(config.socket_addr(), "127.0.0.1:3030".parse().unwrap());
        assert_eq!(config.rules_seed, None);
    }

    #[test]
    fn port_zero_reports_bound_port() {
        let (handle, addr) = start_relay(local_config()).unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
        handle.stop();
    }

    #[test]
    fn bind_conflict_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = RelayConfig {
            port: taken.local_addr().unwrap().port(),
            ..RelayConfig::default()
        };
        match start_relay(config) {
            Err(RelayError::Bind { addr, .. }) => {
                assert_eq!(addr, taken.local_addr().unwrap());
            }
            Err(other) => panic!("expected Bind error, got {other}"),
            Ok(_) => panic!("second bind on the same port succeeded"),
        }
    }

    #[test]
    fn stop_disconnects_clients() {
        let rules = Arc::new(ScriptedRules::punishing(0));
        let (handle, addr) = start_relay_with_rules(local_config(), rules).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        write_json(&mut client, &ClientMessage::Join).unwrap();
        wait_until(|| handle.state().matchmaking.waiting().is_some());

        handle.stop();
        let mut reader = BufReader::new(client);
        let err = gemduel_protocol::read_frame(&mut reader).unwrap_err();
        assert!(err.is_eof(), "{err}");
    }

    #[test]
    fn two_clients_are_paired_through_the_listener() {
        let rules = Arc::new(ScriptedRules::punishing(0));
        let (handle, addr) = start_relay_with_rules(local_config(), rules).unwrap();

        let mut readers = Vec::new();
        for _ in 0..2 {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            write_json(&mut stream, &ClientMessage::Join).unwrap();
            readers.push(BufReader::new(stream));
        }
        for reader in &mut readers {
            assert!(matches!(
                recv_server_msg(reader),
                ServerMessage::SessionStarted { .. }
            ));
        }
        assert_eq!(handle.state().sessions.len(), 2);
        handle.stop();
    }
}
