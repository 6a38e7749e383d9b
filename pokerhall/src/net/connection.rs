//! Per-client connection pipeline.
//!
//! A `Connection` couples a TCP stream with two bounded queues and a
//! dedicated receive thread. The receive thread blocks on the socket,
//! feeds the incremental frame parser, and publishes complete messages
//! to the inbound queue; the owning scheduler (lobby or room) drains
//! that queue, stages replies on the outbound queue, and flushes them
//! to the socket from its own thread. `PING` frames never reach the
//! scheduler: they only clear the keep-alive flag.
//!
//! Ownership is singular: a connection lives in the lobby list, a
//! room's incoming queue, or a seat, never two places at once. The
//! receive thread holds only the shared flag/queue block and a cloned
//! stream handle.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use super::frame::{encode_frame, FrameParser, ParseStatus};
use super::messages::{code, Message};
use super::spsc::Spsc;

/// Capacity of the inbound and outbound message queues.
pub const QUEUE_CAPACITY: usize = 128;

/// Messages drained from one connection per scheduler tick.
pub const MSG_BATCH: usize = 10;

/// Where an unseated connection is in the lobby handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LobbyStage {
    /// Just accepted, waiting for CONN.
    #[default]
    Connected,
    /// Offered RCON, waiting for the client to accept or send PINF.
    AwaitingReconnect,
    /// Nickname accepted, waiting for PINF.
    AwaitingRooms,
    /// Streaming the room list, one ROOM per RMOK.
    SendingRooms,
    /// Room list delivered, waiting for JOIN or RMRQ.
    AwaitingJoin,
    /// Ownership transferred to a room.
    InRoom,
}

struct Shared {
    inbound: Spsc<Message>,
    disconnected: AtomicBool,
    ping_pending: AtomicBool,
}

pub struct Connection {
    stream: TcpStream,
    shared: Arc<Shared>,
    outbound: Spsc<Message>,
    recv_handle: Option<JoinHandle<()>>,

    /// Set after the CONN handshake.
    pub nickname: String,
    /// Set after PINF.
    pub chips: i64,
    pub stage: LobbyStage,
    /// Next room to send while paginating the room list.
    pub room_send_index: usize,
    /// Room that holds a reserved seat for this nickname.
    pub reconnect_room_hint: Option<usize>,
    /// Consecutive unexpected-but-known messages; three in a row
    /// disconnect the client.
    pub fail_count: u32,
}

impl Connection {
    /// Wraps an accepted stream and starts its receive thread.
    pub fn spawn(stream: TcpStream) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            inbound: Spsc::with_capacity(QUEUE_CAPACITY),
            disconnected: AtomicBool::new(false),
            ping_pending: AtomicBool::new(false),
        });
        let reader = stream.try_clone()?;
        let recv_shared = shared.clone();
        let recv_handle = thread::Builder::new()
            .name("conn-recv".to_string())
            .spawn(move || recv_loop(reader, recv_shared))?;
        Ok(Self {
            stream,
            shared,
            outbound: Spsc::with_capacity(QUEUE_CAPACITY),
            recv_handle: Some(recv_handle),
            nickname: String::new(),
            chips: 0,
            stage: LobbyStage::Connected,
            room_send_index: 0,
            reconnect_room_hint: None,
            fail_count: 0,
        })
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared.disconnected.load(Ordering::Acquire)
    }

    /// Monotonic; there is no way back from disconnected.
    pub fn set_disconnected(&self) {
        self.shared.disconnected.store(true, Ordering::Release);
    }

    /// Next inbound message, if any. Consumer side of the inbound queue;
    /// only the owning scheduler may call this.
    pub fn poll_message(&self) -> Option<Message> {
        self.shared.inbound.pop()
    }

    /// Stages a message for the next flush. If the outbound queue is
    /// full it is flushed in place first; both sides of that queue
    /// belong to the owning scheduler thread.
    pub fn send(&mut self, msg: Message) {
        if let Err(msg) = self.outbound.push(msg) {
            self.flush();
            let _ = self.outbound.push(msg);
        }
    }

    /// Writes all staged messages to the socket. A write error marks
    /// the connection disconnected and drops the rest of the batch.
    pub fn flush(&mut self) {
        while let Some(msg) = self.outbound.pop() {
            if self.is_disconnected() {
                return;
            }
            self.write_frame(&msg);
        }
    }

    /// Formats and writes one message synchronously, bypassing the
    /// outbound queue. Used for PING and for a final DCON.
    pub fn send_now(&mut self, msg: &Message) {
        self.write_frame(msg);
    }

    fn write_frame(&mut self, msg: &Message) {
        let bytes = encode_frame(msg);
        if let Err(error) = self.stream.write_all(&bytes) {
            debug!("write failed ({error}), disconnecting {}", self.nickname);
            self.set_disconnected();
        }
    }

    /// One keep-alive interval for this connection: a ping left
    /// unanswered since the previous interval means the peer is gone;
    /// otherwise arm the flag and ping again.
    pub fn keepalive_tick(&mut self) {
        if self.is_disconnected() {
            return;
        }
        if self.shared.ping_pending.load(Ordering::Acquire) {
            debug!("ping timeout, disconnecting {}", self.nickname);
            self.set_disconnected();
        } else {
            self.shared.ping_pending.store(true, Ordering::Release);
            self.send_now(&Message::bare(code::PING));
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.set_disconnected();
        // Unblocks the receive thread's read.
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.recv_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Blocking receive loop: read, parse, publish. Exits on EOF, read
/// error, or framing error, leaving the disconnected flag set.
fn recv_loop(mut stream: TcpStream, shared: Arc<Shared>) {
    let mut parser = FrameParser::new();
    let mut buf = [0u8; 256];
    loop {
        if shared.disconnected.load(Ordering::Acquire) {
            break;
        }
        let bytes_read = match stream.read(&mut buf) {
            Ok(0) => {
                debug!("peer closed connection");
                break;
            }
            Ok(n) => n,
            Err(error) => {
                debug!("read failed: {error}");
                break;
            }
        };

        let mut consumed = 0;
        while consumed < bytes_read {
            let outcome = parser.parse_bytes(&buf[consumed..bytes_read]);
            consumed += outcome.bytes_parsed;
            match outcome.status {
                ParseStatus::Incomplete => {}
                ParseStatus::Failed(error) => {
                    // No resync: a framing error poisons the stream.
                    warn!("framing error: {error}");
                    shared.disconnected.store(true, Ordering::Release);
                    return;
                }
                ParseStatus::Done(msg) => {
                    parser.reset();
                    if msg.code == code::PING {
                        shared.ping_pending.store(false, Ordering::Release);
                        continue;
                    }
                    let ok = shared
                        .inbound
                        .wait_push(msg, || shared.disconnected.load(Ordering::Acquire));
                    if !ok {
                        return;
                    }
                }
            }
        }
    }
    shared.disconnected.store(true, Ordering::Release);
}
