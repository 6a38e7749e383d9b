//! Multi-room poker server.
//!
//! Binds a TCP listener, spawns the lobby and room worker threads, and
//! runs until interrupted.

mod logging;

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use anyhow::{bail, Context, Result};
use pico_args::Arguments;
use pokerhall::{server, ServerConfig};

const HELP: &str = "\
Run a multi-room poker server

USAGE:
  ph_server <PORT> [BIND_IP]

ARGS:
  <PORT>      TCP port to listen on (0..65535)
  [BIND_IP]   Dotted IPv4 address to bind; all interfaces if absent

FLAGS:
  -h, --help  Print help information
";

struct Args {
    port: u16,
    bind_ip: Option<Ipv4Addr>,
}

fn parse_args() -> Result<Args> {
    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let port: u16 = pargs
        .free_from_str()
        .context("missing or invalid port (expected 0..65535)")?;
    let bind_ip: Option<Ipv4Addr> = pargs
        .opt_free_from_str()
        .context("invalid bind address (expected a dotted IPv4 address)")?;

    let leftover = pargs.finish();
    if !leftover.is_empty() {
        bail!("unexpected arguments: {leftover:?}");
    }

    Ok(Args { port, bind_ip })
}

fn main() -> Result<()> {
    let args = parse_args()?;

    logging::init();

    let config = ServerConfig::new(args.port, args.bind_ip);
    let handle = server::start(config).context("failed to start server")?;

    // Ctrl-C clears the running flag; every loop drains its current
    // iteration and exits.
    let running = handle.running_flag();
    ctrlc::set_handler(move || {
        running.store(false, Ordering::Release);
    })
    .context("failed to install signal handler")?;

    tracing::info!("server running at {}; press Ctrl+C to stop", handle.addr());
    handle.wait();
    tracing::info!("server stopped");

    Ok(())
}
