//! Outer frame encoding and the incremental, byte-at-a-time parser.
//!
//! Frame layout: `P K R` magic, one kind byte (`'P'` payload /
//! `'N'` no payload), four code bytes, then for payload frames a
//! four-digit decimal length and exactly that many payload bytes, and
//! finally a single `\n`.
//!
//! The parser accepts frames split across arbitrarily many chunks and
//! multiple frames packed into one chunk. After a frame completes it
//! must be `reset()` before more bytes are fed; a framing error is
//! terminal for the connection (no resync is attempted).

use super::codec::WireError;
use super::messages::{Code, Message, MsgKind};

pub const MAGIC: &[u8; 3] = b"PKR";
pub const CODE_LEN: usize = 4;
pub const PAYLOAD_LEN_DIGITS: usize = 4;

/// Serializes a message into a complete wire frame.
pub fn encode_frame(msg: &Message) -> Vec<u8> {
    let payload_len = msg.payload.as_ref().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(MAGIC.len() + 1 + CODE_LEN + PAYLOAD_LEN_DIGITS + payload_len + 1);
    out.extend_from_slice(MAGIC);
    out.push(msg.kind().wire_byte());
    out.extend_from_slice(&msg.code.0);
    if let Some(payload) = &msg.payload {
        out.extend_from_slice(format!("{:04}", payload.len()).as_bytes());
        out.extend_from_slice(payload);
    }
    out.push(b'\n');
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Magic1,
    Magic2,
    Magic3,
    Kind,
    Code,
    Size,
    Payload,
    Endline,
    Done,
}

/// Result of feeding one chunk of bytes to the parser.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Bytes of the chunk consumed before completing, failing, or
    /// running out of input.
    pub bytes_parsed: usize,
    pub status: ParseStatus,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed to finish the current frame.
    Incomplete,
    /// A full frame was parsed; reset before feeding more bytes.
    Done(Message),
    /// Framing error; the connection must be dropped.
    Failed(WireError),
}

/// Incremental single-connection frame parser.
pub struct FrameParser {
    phase: Phase,
    kind: MsgKind,
    code: [u8; 4],
    code_index: usize,
    size_index: usize,
    payload_len: usize,
    payload: Vec<u8>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            phase: Phase::Magic1,
            kind: MsgKind::NoPayload,
            code: [0; 4],
            code_index: 0,
            size_index: 0,
            payload_len: 0,
            payload: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Magic1;
        self.kind = MsgKind::NoPayload;
        self.code = [0; 4];
        self.code_index = 0;
        self.size_index = 0;
        self.payload_len = 0;
        self.payload.clear();
    }

    /// Feeds one byte. `Ok(true)` means a frame just completed.
    fn parse_byte(&mut self, byte: u8) -> Result<bool, WireError> {
        match self.phase {
            Phase::Magic1 => {
                if byte != b'P' {
                    return Err(WireError::BadMagic(byte));
                }
                self.phase = Phase::Magic2;
            }
            Phase::Magic2 => {
                if byte != b'K' {
                    return Err(WireError::BadMagic(byte));
                }
                self.phase = Phase::Magic3;
            }
            Phase::Magic3 => {
                if byte != b'R' {
                    return Err(WireError::BadMagic(byte));
                }
                self.phase = Phase::Kind;
            }
            Phase::Kind => {
                self.kind = match byte {
                    b'P' => MsgKind::Payload,
                    b'N' => MsgKind::NoPayload,
                    other => return Err(WireError::BadKind(other)),
                };
                self.phase = Phase::Code;
            }
            Phase::Code => {
                self.code[self.code_index] = byte;
                self.code_index += 1;
                if self.code_index == CODE_LEN {
                    self.phase = match self.kind {
                        MsgKind::NoPayload => Phase::Endline,
                        MsgKind::Payload => Phase::Size,
                    };
                }
            }
            Phase::Size => {
                if !byte.is_ascii_digit() {
                    return Err(WireError::NonDigit(byte));
                }
                self.payload_len = self.payload_len * 10 + usize::from(byte - b'0');
                self.size_index += 1;
                if self.size_index == PAYLOAD_LEN_DIGITS {
                    if self.payload_len == 0 {
                        self.phase = Phase::Endline;
                    } else {
                        // The payload buffer grows to the declared size
                        // at most; no per-byte allocation.
                        self.payload.reserve_exact(self.payload_len);
                        self.phase = Phase::Payload;
                    }
                }
            }
            Phase::Payload => {
                self.payload.push(byte);
                if self.payload.len() == self.payload_len {
                    self.phase = Phase::Endline;
                }
            }
            Phase::Endline => {
                if byte != b'\n' {
                    return Err(WireError::MissingNewline);
                }
                self.phase = Phase::Done;
                return Ok(true);
            }
            Phase::Done => return Err(WireError::NotReset),
        }
        Ok(false)
    }

    /// Consumes bytes from `chunk` until a frame completes, a framing
    /// error occurs, or the chunk is exhausted.
    pub fn parse_bytes(&mut self, chunk: &[u8]) -> ParseOutcome {
        let mut consumed = 0;
        for &byte in chunk {
            match self.parse_byte(byte) {
                Ok(false) => consumed += 1,
                Ok(true) => {
                    consumed += 1;
                    let payload = match self.kind {
                        MsgKind::Payload => Some(std::mem::take(&mut self.payload)),
                        MsgKind::NoPayload => None,
                    };
                    let message = Message {
                        code: Code(self.code),
                        payload,
                    };
                    return ParseOutcome {
                        bytes_parsed: consumed,
                        status: ParseStatus::Done(message),
                    };
                }
                Err(error) => {
                    // The errored byte counts as consumed, matching the
                    // per-byte advance of the loop.
                    consumed += 1;
                    return ParseOutcome {
                        bytes_parsed: consumed,
                        status: ParseStatus::Failed(error),
                    };
                }
            }
        }
        ParseOutcome {
            bytes_parsed: consumed,
            status: ParseStatus::Incomplete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::messages::code;
    use super::*;

    fn parse_whole(bytes: &[u8]) -> ParseOutcome {
        FrameParser::new().parse_bytes(bytes)
    }

    #[test]
    fn encodes_no_payload_frame() {
        let frame = encode_frame(&Message::bare(code::PNOK));
        assert_eq!(frame, b"PKRNPNOK\n");
    }

    #[test]
    fn encodes_payload_frame() {
        let frame = encode_frame(&Message::conn("Alice"));
        assert_eq!(frame, b"PKRPCONN00090005Alice\n");
    }

    #[test]
    fn parses_no_payload_frame() {
        let outcome = parse_whole(b"PKRNRMRQ\n");
        assert_eq!(outcome.bytes_parsed, 9);
        assert_eq!(outcome.status, ParseStatus::Done(Message::bare(code::RMRQ)));
    }

    #[test]
    fn parses_payload_frame() {
        let outcome = parse_whole(b"PKRPCONN00090005Alice\n");
        assert_eq!(outcome.status, ParseStatus::Done(Message::conn("Alice")));
    }

    #[test]
    fn round_trips_every_shape() {
        for msg in [
            Message::bare(code::DONE),
            Message::conn("Bob"),
            Message::player_info(2500),
            Message::join(1),
            Message::bet(-5),
        ] {
            let outcome = parse_whole(&encode_frame(&msg));
            assert_eq!(outcome.status, ParseStatus::Done(msg));
        }
    }

    #[test]
    fn accepts_frames_split_across_chunks() {
        let frame = encode_frame(&Message::conn("Alice"));
        let mut parser = FrameParser::new();
        for split in 1..frame.len() - 1 {
            parser.reset();
            let first = parser.parse_bytes(&frame[..split]);
            assert_eq!(first.bytes_parsed, split);
            assert_eq!(first.status, ParseStatus::Incomplete);
            let second = parser.parse_bytes(&frame[split..]);
            assert_eq!(second.status, ParseStatus::Done(Message::conn("Alice")));
        }
    }

    #[test]
    fn leaves_trailing_bytes_of_packed_frames() {
        let mut bytes = encode_frame(&Message::bare(code::RMOK));
        bytes.extend_from_slice(&encode_frame(&Message::bare(code::RMRQ)));
        let mut parser = FrameParser::new();

        let first = parser.parse_bytes(&bytes);
        assert_eq!(first.bytes_parsed, 9);
        assert_eq!(first.status, ParseStatus::Done(Message::bare(code::RMOK)));

        parser.reset();
        let second = parser.parse_bytes(&bytes[first.bytes_parsed..]);
        assert_eq!(second.status, ParseStatus::Done(Message::bare(code::RMRQ)));
    }

    #[test]
    fn rejects_bad_magic() {
        let outcome = parse_whole(b"XKRNRMRQ\n");
        assert_eq!(outcome.status, ParseStatus::Failed(WireError::BadMagic(b'X')));
        let outcome = parse_whole(b"PKXNRMRQ\n");
        assert_eq!(outcome.status, ParseStatus::Failed(WireError::BadMagic(b'X')));
    }

    #[test]
    fn rejects_unknown_kind() {
        let outcome = parse_whole(b"PKRQRMRQ\n");
        assert_eq!(outcome.status, ParseStatus::Failed(WireError::BadKind(b'Q')));
    }

    #[test]
    fn rejects_non_digit_size() {
        let outcome = parse_whole(b"PKRPCONN00x90005Alice\n");
        assert_eq!(outcome.status, ParseStatus::Failed(WireError::NonDigit(b'x')));
    }

    #[test]
    fn rejects_missing_newline() {
        let outcome = parse_whole(b"PKRNRMRQX");
        assert_eq!(
            outcome.status,
            ParseStatus::Failed(WireError::MissingNewline)
        );
    }

    #[test]
    fn handles_zero_length_payload_frames() {
        // A 'P' frame declaring zero payload bytes goes straight to the
        // terminator instead of waiting for payload that never comes.
        let outcome = parse_whole(b"PKRPRMRQ0000\n");
        assert_eq!(
            outcome.status,
            ParseStatus::Done(Message::with_payload(code::RMRQ, Vec::new()))
        );
    }

    #[test]
    fn requires_reset_between_frames() {
        let mut parser = FrameParser::new();
        let frame = encode_frame(&Message::bare(code::RMOK));
        let first = parser.parse_bytes(&frame);
        assert!(matches!(first.status, ParseStatus::Done(_)));

        // Without a reset, any further byte is rejected.
        let stuck = parser.parse_bytes(b"P");
        assert_eq!(stuck.status, ParseStatus::Failed(WireError::NotReset));

        parser.reset();
        let again = parser.parse_bytes(&frame);
        assert!(matches!(again.status, ParseStatus::Done(_)));
    }
}
