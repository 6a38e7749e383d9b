//! A low-level blocking TCP poker client.
//!
//! This client is synchronous and so is primarily used as a testing
//! utility rather than an actual poker client. It speaks the PKR
//! framing, answers server keep-alive pings transparently, and offers
//! thin typed helpers for each client-side message.

use anyhow::{bail, Error};
use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use super::{
    codec::PayloadReader,
    frame::{encode_frame, FrameParser, ParseStatus},
    messages::{code, Code, Message},
};

/// Default timeout for reading from the server.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for writing to the server.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// One entry of the paginated room list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomEntry {
    pub id: u16,
    pub name: String,
    pub occupied: u8,
    pub capacity: u8,
}

/// A blocking TCP client for connecting to a poker server.
pub struct Client {
    /// The nickname sent in the CONN handshake.
    pub nickname: String,
    stream: TcpStream,
    parser: FrameParser,
    carry: Vec<u8>,
}

impl Client {
    /// Connects and performs the CONN handshake, returning the client
    /// and the server's first reply (`PNOK`, `RCON`, or `FAIL`).
    ///
    /// Connection attempts back off through three decreasing timeouts,
    /// the same ladder the connect path has always used.
    ///
    /// # Errors
    ///
    /// Returns an error if no attempt connects or if the handshake
    /// cannot be written or read.
    pub fn connect(nickname: &str, addr: &SocketAddr) -> Result<(Self, Message), Error> {
        let mut connect_timeouts = vec![
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_millis(100),
        ];
        while let Some(connect_timeout) = connect_timeouts.pop() {
            match TcpStream::connect_timeout(addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(READ_TIMEOUT))?;
                    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                    let mut client = Self {
                        nickname: nickname.to_string(),
                        stream,
                        parser: FrameParser::new(),
                        carry: Vec::new(),
                    };
                    client.send(&Message::conn(nickname))?;
                    let reply = client.recv()?;
                    return Ok((client, reply));
                }
                _ => thread::sleep(connect_timeout),
            }
        }
        bail!("couldn't connect to {addr} as {nickname}")
    }

    pub fn send(&mut self, msg: &Message) -> Result<(), Error> {
        self.stream.write_all(&encode_frame(msg))?;
        Ok(())
    }

    /// Receives the next application message, blocking up to the read
    /// timeout. Server `PING`s are answered in place and never
    /// surfaced.
    pub fn recv(&mut self) -> Result<Message, Error> {
        loop {
            while !self.carry.is_empty() {
                let outcome = self.parser.parse_bytes(&self.carry);
                self.carry.drain(..outcome.bytes_parsed);
                match outcome.status {
                    ParseStatus::Incomplete => break,
                    ParseStatus::Failed(error) => bail!("framing error from server: {error}"),
                    ParseStatus::Done(msg) => {
                        self.parser.reset();
                        if msg.code == code::PING {
                            self.send(&Message::bare(code::PING))?;
                            continue;
                        }
                        return Ok(msg);
                    }
                }
            }
            let mut chunk = [0u8; 256];
            let bytes_read = self.stream.read(&mut chunk)?;
            if bytes_read == 0 {
                bail!("server closed the connection");
            }
            self.carry.extend_from_slice(&chunk[..bytes_read]);
        }
    }

    /// Receives the next message and fails unless it carries the
    /// expected code.
    pub fn recv_expect(&mut self, expected: Code) -> Result<Message, Error> {
        let msg = self.recv()?;
        if msg.code != expected {
            bail!("expected {expected}, server sent {msg}");
        }
        Ok(msg)
    }

    /// Receives messages until one with the expected code arrives,
    /// discarding everything else. Useful when broadcasts interleave.
    pub fn recv_until(&mut self, expected: Code) -> Result<Message, Error> {
        loop {
            let msg = self.recv()?;
            if msg.code == expected {
                return Ok(msg);
            }
        }
    }

    pub fn send_player_info(&mut self, chips: i64) -> Result<(), Error> {
        self.send(&Message::player_info(chips))
    }

    /// Requests and collects the full paginated room list, RMOK-ing
    /// each entry until DONE.
    pub fn request_rooms(&mut self) -> Result<Vec<RoomEntry>, Error> {
        self.send(&Message::bare(code::RMRQ))?;
        let mut rooms = Vec::new();
        loop {
            let msg = self.recv()?;
            if msg.code == code::DONE {
                return Ok(rooms);
            }
            if msg.code != code::ROOM {
                bail!("expected ROOM or DONE, server sent {msg}");
            }
            let Some(payload) = &msg.payload else {
                bail!("ROOM without payload");
            };
            let mut reader = PayloadReader::new(payload);
            rooms.push(RoomEntry {
                id: reader.bg_int()?,
                name: reader.net_str()?,
                occupied: reader.sm_int()?,
                capacity: reader.sm_int()?,
            });
            self.send(&Message::bare(code::RMOK))?;
        }
    }

    pub fn join(&mut self, room_id: u16) -> Result<(), Error> {
        self.send(&Message::join(room_id))
    }

    pub fn accept_reconnect(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::RCON))
    }

    pub fn ready(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::RDY1))
    }

    pub fn check(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::CHCK))
    }

    pub fn call(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::CALL))
    }

    pub fn fold(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::FOLD))
    }

    pub fn bet(&mut self, amount: i64) -> Result<(), Error> {
        self.send(&Message::bet(amount))
    }

    pub fn showdown_ok(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::SDOK))
    }

    pub fn leave_room(&mut self) -> Result<(), Error> {
        self.send(&Message::bare(code::GMLV))
    }
}
