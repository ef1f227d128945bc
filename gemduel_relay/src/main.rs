// CLI entry point for the Gem Duel relay.
//
// Starts a standalone relay that pairs clients and relays their moves,
// resolving each move with the reference gem rules. See `server.rs` for the
// networking architecture and `turn.rs` for what each player is told.
//
// Logging goes to stderr through `tracing_subscriber`; `RUST_LOG` overrides
// the default `info` level (e.g. `RUST_LOG=gemduel_relay=debug`).

use std::net::IpAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use gemduel_relay::server::{RelayConfig, start_relay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Two-player matchmaking and turn relay for Gem Duel")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on (0 lets the OS pick)
    #[arg(long, default_value_t = 3030)]
    port: u16,

    /// Seed for the reference rules; random if omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds a write to one client may block before it is abandoned
    #[arg(long, default_value_t = 5)]
    write_timeout_secs: u64,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_address: args.bind,
            port: args.port,
            rules_seed: args.seed,
            write_timeout: Duration::from_secs(args.write_timeout_secs),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (handle, addr) = match start_relay(args.into()) {
        Ok(started) => started,
        Err(e) => {
            error!(error = %e, "failed to start relay");
            return ExitCode::FAILURE;
        }
    };
    info!(%addr, "relay ready, stop with Ctrl+C");

    // The process exits on SIGINT/SIGTERM; the listener only returns on a
    // fatal accept error.
    handle.wait();
    error!("listener stopped unexpectedly");
    ExitCode::FAILURE
}
