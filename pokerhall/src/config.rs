//! Server and room configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Tunables shared by every room in a server.
#[derive(Clone, Copy, Debug)]
pub struct RoomSettings {
    /// Seats per room.
    pub max_seats: usize,
    /// Room logic loop interval.
    pub tick_interval: Duration,
    /// Keep-alive ping cadence; a ping unanswered for a full interval
    /// disconnects the peer.
    pub ping_interval: Duration,
    /// How long the current actor has to reply before being auto-folded.
    pub turn_timeout: Duration,
    /// How long the showdown waits for SDOK acks before moving on.
    pub showdown_ack_timeout: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_seats: 4,
            tick_interval: Duration::from_millis(10),
            ping_interval: Duration::from_secs(10),
            turn_timeout: Duration::from_secs(30),
            showdown_ack_timeout: Duration::from_secs(10),
        }
    }
}

/// Full server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listening address. Port 0 binds an ephemeral port, which tests
    /// read back from the started server.
    pub bind: SocketAddr,
    /// Rooms to create at startup: (id, name).
    pub rooms: Vec<(u16, String)>,
    /// Lobby logic loop interval.
    pub lobby_tick: Duration,
    pub room: RoomSettings,
}

impl ServerConfig {
    /// Configuration for the given port and optional IPv4 bind
    /// address; everything else at defaults.
    pub fn new(port: u16, ip: Option<Ipv4Addr>) -> Self {
        Self {
            bind: SocketAddr::new(
                IpAddr::V4(ip.unwrap_or(Ipv4Addr::UNSPECIFIED)),
                port,
            ),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            rooms: (1..=4).map(|i| (i, format!("Room {i}"))).collect(),
            lobby_tick: Duration::from_millis(50),
            room: RoomSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_four_rooms() {
        let config = ServerConfig::default();
        assert_eq!(config.rooms.len(), 4);
        assert_eq!(config.rooms[0], (1, "Room 1".to_string()));
    }

    #[test]
    fn new_fills_in_bind_address() {
        let config = ServerConfig::new(4242, Some(Ipv4Addr::LOCALHOST));
        assert_eq!(config.bind.to_string(), "127.0.0.1:4242");
    }
}
