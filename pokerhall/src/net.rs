//! Networking layer for client-server communication.
//!
//! TCP with a hand-rolled ASCII framing (`PKR` magic, four-byte codes,
//! decimal lengths). The server is thread-per-connection with blocking
//! sockets; each connection gets a receive thread feeding an
//! incremental parser.

/// Blocking TCP client for connecting to a poker server.
pub mod client;

/// Field-level wire primitives (sm_int, bg_int, var_int, net_str).
pub mod codec;

/// Per-client pipeline: receive thread, queues, keep-alive.
pub mod connection;

/// Outer frame encoding and the incremental frame parser.
pub mod frame;

/// Message codes and the `Message` type.
pub mod messages;

/// Bounded single-producer/single-consumer queue.
pub mod spsc;
