/// Smoke tests for server startup and shutdown.
use std::time::Duration;

use pokerhall::net::client::Client;
use pokerhall::net::messages::code;
use pokerhall::{server, ServerConfig};

#[test]
fn starts_serves_and_shuts_down() {
    let mut config = ServerConfig::default();
    config.bind = "127.0.0.1:0".parse().unwrap();
    config.lobby_tick = Duration::from_millis(10);
    let handle = server::start(config).unwrap();
    let addr = handle.addr();
    assert_ne!(addr.port(), 0);

    let (_client, reply) = Client::connect("smoke", &addr).unwrap();
    assert_eq!(reply.code, code::PNOK);

    // Shutdown joins every thread; a hang here fails the test via the
    // harness timeout.
    handle.shutdown();
}

#[test]
fn bind_failure_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let mut config = ServerConfig::default();
    config.bind = addr;
    assert!(server::start(config).is_err());
}
