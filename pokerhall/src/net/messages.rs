//! Message vocabulary for the PKR protocol.
//!
//! Every message is a four-byte ASCII code plus an optional payload.
//! Codes are fixed; payload layouts are described next to each code.

use std::fmt;

use super::codec::PayloadWriter;

/// A four-byte ASCII message code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(pub [u8; 4]);

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &byte in &self.0 {
            write!(f, "{}", byte as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Code({self})")
    }
}

pub mod code {
    use super::Code;

    // Connection handshake (client <-> server)
    pub const CONN: Code = Code(*b"CONN"); // Client: hello with nickname
    pub const PNOK: Code = Code(*b"PNOK"); // Server: nickname accepted
    pub const RCON: Code = Code(*b"RCON"); // Server: reconnect offered / Client: reconnect accepted
    pub const FAIL: Code = Code(*b"FAIL"); // Server: generic failure
    pub const PINF: Code = Code(*b"PINF"); // Client: player info (chips)
    pub const PIOK: Code = Code(*b"PIOK"); // Server: player info accepted

    // Room listing (client <-> server)
    pub const RMRQ: Code = Code(*b"RMRQ"); // Client: request room list
    pub const ROOM: Code = Code(*b"ROOM"); // Server: one room entry
    pub const DONE: Code = Code(*b"DONE"); // Server: end of room list
    pub const RMOK: Code = Code(*b"RMOK"); // Client: room entry received
    pub const RMFL: Code = Code(*b"RMFL"); // Client: room entry rejected

    // Join room (client <-> server)
    pub const JOIN: Code = Code(*b"JOIN"); // Client: join request
    pub const JNOK: Code = Code(*b"JNOK"); // Server: join accepted
    pub const JNFL: Code = Code(*b"JNFL"); // Server: join rejected

    // Room state sync (server -> client)
    pub const RMST: Code = Code(*b"RMST"); // Server: full room snapshot
    pub const PJIN: Code = Code(*b"PJIN"); // Server: player joined / reconnected

    // In-room actions (client -> room)
    pub const RDY1: Code = Code(*b"RDY1"); // Client: ready for next hand
    pub const GMLV: Code = Code(*b"GMLV"); // Client: leave room
    pub const CHCK: Code = Code(*b"CHCK"); // Client: check
    pub const FOLD: Code = Code(*b"FOLD"); // Client: fold
    pub const CALL: Code = Code(*b"CALL"); // Client: call
    pub const BETT: Code = Code(*b"BETT"); // Client: bet amount

    // In-room responses (room -> client)
    pub const PRDY: Code = Code(*b"PRDY"); // Server: player ready broadcast
    pub const GMST: Code = Code(*b"GMST"); // Server: game started, room locked
    pub const GMRD: Code = Code(*b"GMRD"); // Server: new betting round
    pub const CDTP: Code = Code(*b"CDTP"); // Server: hole cards, privately
    pub const CRVR: Code = Code(*b"CRVR"); // Server: community card reveal
    pub const PTRN: Code = Code(*b"PTRN"); // Server: player's turn
    pub const ACOK: Code = Code(*b"ACOK"); // Server: action accepted
    pub const ACFL: Code = Code(*b"ACFL"); // Server: action rejected, with reason
    pub const NYET: Code = Code(*b"NYET"); // Server: not your turn
    pub const PACT: Code = Code(*b"PACT"); // Server: player action broadcast

    // Showdown and hand end (server <-> client)
    pub const SDWN: Code = Code(*b"SDWN"); // Server: showdown with all hands
    pub const SDOK: Code = Code(*b"SDOK"); // Client: showdown acknowledged
    pub const GWIN: Code = Code(*b"GWIN"); // Server: winner and pot
    pub const GMDN: Code = Code(*b"GMDN"); // Server: hand done, back to lobby

    // Transport level (both directions)
    pub const PING: Code = Code(*b"PING"); // Keep-alive; never surfaced above the pipeline
    pub const DCON: Code = Code(*b"DCON"); // Forceful disconnect
}

/// Wire-level seat action values carried by PACT and seat blocks.
pub mod action_value {
    pub const NONE: u8 = 0;
    pub const CHECK: u8 = 1;
    pub const CALL: u8 = 2;
    pub const FOLD: u8 = 3;
    pub const BET: u8 = 4;
    pub const LEFT: u8 = 5;
}

/// Whether a frame carries a payload (`'P'`) or not (`'N'`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MsgKind {
    Payload,
    NoPayload,
}

impl MsgKind {
    pub fn wire_byte(self) -> u8 {
        match self {
            Self::Payload => b'P',
            Self::NoPayload => b'N',
        }
    }
}

/// One application message, as parsed off or about to go onto the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub code: Code,
    pub payload: Option<Vec<u8>>,
}

impl Message {
    pub fn bare(code: Code) -> Self {
        Self {
            code,
            payload: None,
        }
    }

    pub fn with_payload(code: Code, payload: Vec<u8>) -> Self {
        Self {
            code,
            payload: Some(payload),
        }
    }

    pub fn kind(&self) -> MsgKind {
        if self.payload.is_some() {
            MsgKind::Payload
        } else {
            MsgKind::NoPayload
        }
    }

    /// Client handshake: `CONN` with a `net_str` nickname.
    pub fn conn(nickname: &str) -> Self {
        Self::with_payload(code::CONN, PayloadWriter::new().net_str(nickname).finish())
    }

    /// Client player info: `PINF` with a `var_int` chip count.
    pub fn player_info(chips: i64) -> Self {
        Self::with_payload(code::PINF, PayloadWriter::new().var_int(chips).finish())
    }

    /// Client join request: `JOIN` with a `bg_int` room id.
    pub fn join(room_id: u16) -> Self {
        Self::with_payload(code::JOIN, PayloadWriter::new().bg_int(room_id).finish())
    }

    /// Client bet: `BETT` with a `var_int` amount.
    pub fn bet(amount: i64) -> Self {
        Self::with_payload(code::BETT, PayloadWriter::new().var_int(amount).finish())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.payload {
            Some(payload) => write!(f, "{} ({} payload bytes)", self.code, payload.len()),
            None => write!(f, "{}", self.code),
        }
    }
}

/// Whether a code belongs to the protocol catalog at all. Messages with
/// unknown codes are a protocol error and the sender is disconnected.
pub fn is_known(candidate: Code) -> bool {
    use code::*;
    const CATALOG: &[Code] = &[
        CONN, PNOK, RCON, FAIL, PINF, PIOK, RMRQ, ROOM, DONE, RMOK, RMFL, JOIN, JNOK, JNFL, RMST,
        PJIN, RDY1, GMLV, CHCK, FOLD, CALL, BETT, PRDY, GMST, GMRD, CDTP, CRVR, PTRN, ACOK, ACFL,
        NYET, PACT, SDWN, SDOK, GWIN, GMDN, PING, DCON,
    ];
    CATALOG.contains(&candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_displays_as_ascii() {
        assert_eq!(code::CONN.to_string(), "CONN");
    }

    #[test]
    fn kind_follows_payload_presence() {
        assert_eq!(Message::bare(code::RMRQ).kind(), MsgKind::NoPayload);
        assert_eq!(Message::conn("Alice").kind(), MsgKind::Payload);
    }

    #[test]
    fn conn_payload_layout() {
        let msg = Message::conn("Alice");
        assert_eq!(msg.payload.as_deref(), Some(&b"0005Alice"[..]));
    }

    #[test]
    fn bet_payload_layout() {
        let msg = Message::bet(1000);
        assert_eq!(msg.payload.as_deref(), Some(&b"041000"[..]));
    }

    #[test]
    fn catalog_membership() {
        assert!(is_known(code::GMLV));
        assert!(!is_known(Code(*b"XXXX")));
    }
}
