//! # Pokerhall
//!
//! A multi-room Texas Hold'em server core built on a thread-per-room,
//! thread-per-connection design with blocking sockets.
//!
//! ## Architecture
//!
//! Bytes arrive on a socket and are framed by an incremental parser
//! into messages; messages flow through bounded per-connection queues
//! to the scheduler that currently owns the connection. The lobby
//! scheduler performs the handshake, player-info exchange, room
//! listing, and join/reconnect routing; when a join succeeds the
//! connection's ownership moves to the target room. Each room runs a
//! five-phase state machine:
//!
//! - **Lobby**: waiting for seated players to ready up
//! - **Dealing**: room locks, hole cards go out
//! - **CommunityCard**: flop/turn/river reveals
//! - **Betting**: the action queue, one bet per round, turn timeouts
//! - **Showdown**: hands revealed, winner paid, acks collected
//!
//! ## Core modules
//!
//! - [`net`]: wire codec, frame parser, connection pipeline, blocking client
//! - [`game`]: cards, deck, hand evaluation
//! - [`room`]: per-room scheduler and phase handlers
//! - [`server`]: listener and lobby scheduler
//!
//! ## Example
//!
//! ```no_run
//! use pokerhall::{server, ServerConfig};
//!
//! let handle = server::start(ServerConfig::new(4242, None)).unwrap();
//! println!("listening on {}", handle.addr());
//! handle.wait();
//! ```

/// Server and room configuration.
pub mod config;

/// Cards, deck, and hand evaluation.
pub mod game;

/// Networking: codec, parser, connection pipeline, client.
pub mod net;

/// Per-room scheduler and game state machine.
pub mod room;

/// Listener and lobby scheduler.
pub mod server;

pub use config::{RoomSettings, ServerConfig};
pub use game::{score_hand, Card, Chips, Deck, HandScore, SeatAction};
pub use net::{
    client::Client,
    connection::Connection,
    messages::{code, Message},
};
pub use server::{start, ServerError, ServerHandle};
