//! Field-level wire primitives for the PKR protocol.
//!
//! Everything on the wire is ASCII: fixed-width zero-padded integers,
//! digit-count-prefixed signed integers, and length-prefixed strings.
//! Writers are total for in-range values and do no bounds checking;
//! feeding an out-of-range value produces a corrupt field, which is a
//! caller bug. Readers are partial and report how many bytes they
//! consumed so payloads can be walked field by field.

use std::str;

use thiserror::Error;

/// Width of an `sm_int` field.
pub const SM_INT_LEN: usize = 2;
/// Width of a `bg_int` field (also the `net_str` length prefix).
pub const BG_INT_LEN: usize = 4;

/// Errors produced while decoding wire fields or frames.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("too few bytes for field")]
    ShortInput,
    #[error("non-digit byte 0x{0:02x} in numeric field")]
    NonDigit(u8),
    #[error("declared length overruns buffer")]
    LengthOverrun,
    #[error("var_int body is not a valid signed 64-bit integer")]
    BadVarInt,
    #[error("string field is not valid UTF-8")]
    BadUtf8,
    #[error("invalid magic byte 0x{0:02x}")]
    BadMagic(u8),
    #[error("unknown message kind byte 0x{0:02x}")]
    BadKind(u8),
    #[error("frame not terminated by newline")]
    MissingNewline,
    #[error("parser already finished; reset required")]
    NotReset,
}

fn read_fixed_decimal(buf: &[u8], width: usize) -> Result<u64, WireError> {
    if buf.len() < width {
        return Err(WireError::ShortInput);
    }
    let mut value = 0u64;
    for &byte in &buf[..width] {
        if !byte.is_ascii_digit() {
            return Err(WireError::NonDigit(byte));
        }
        value = value * 10 + u64::from(byte - b'0');
    }
    Ok(value)
}

/// Two decimal digits, zero-padded. Range 0..=99.
pub fn write_sm_int(out: &mut Vec<u8>, value: u8) {
    out.extend_from_slice(format!("{value:02}").as_bytes());
}

pub fn read_sm_int(buf: &[u8]) -> Result<(u8, usize), WireError> {
    let value = read_fixed_decimal(buf, SM_INT_LEN)?;
    Ok((value as u8, SM_INT_LEN))
}

/// Four decimal digits, zero-padded. Range 0..=9999.
pub fn write_bg_int(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(format!("{value:04}").as_bytes());
}

pub fn read_bg_int(buf: &[u8]) -> Result<(u16, usize), WireError> {
    let value = read_fixed_decimal(buf, BG_INT_LEN)?;
    Ok((value as u16, BG_INT_LEN))
}

/// An `sm_int` digit count followed by that many decimal digits; a
/// leading `-` counts toward the digit count.
pub fn write_var_int(out: &mut Vec<u8>, value: i64) {
    let digits = value.to_string();
    write_sm_int(out, digits.len() as u8);
    out.extend_from_slice(digits.as_bytes());
}

pub fn read_var_int(buf: &[u8]) -> Result<(i64, usize), WireError> {
    let (len, consumed) = read_sm_int(buf)?;
    let len = len as usize;
    let body = buf
        .get(consumed..consumed + len)
        .ok_or(WireError::LengthOverrun)?;
    let body = str::from_utf8(body).map_err(|_| WireError::BadVarInt)?;
    let value = body.parse::<i64>().map_err(|_| WireError::BadVarInt)?;
    Ok((value, consumed + len))
}

/// A `bg_int` byte length followed by that many UTF-8 bytes.
pub fn write_net_str(out: &mut Vec<u8>, value: &str) {
    write_bg_int(out, value.len() as u16);
    out.extend_from_slice(value.as_bytes());
}

pub fn read_net_str(buf: &[u8]) -> Result<(String, usize), WireError> {
    let (len, consumed) = read_bg_int(buf)?;
    let len = len as usize;
    let body = buf
        .get(consumed..consumed + len)
        .ok_or(WireError::LengthOverrun)?;
    let value = str::from_utf8(body)
        .map_err(|_| WireError::BadUtf8)?
        .to_string();
    Ok((value, consumed + len))
}

/// Builds a multi-field payload without manual offset bookkeeping.
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sm_int(mut self, value: u8) -> Self {
        write_sm_int(&mut self.buf, value);
        self
    }

    pub fn bg_int(mut self, value: u16) -> Self {
        write_bg_int(&mut self.buf, value);
        self
    }

    pub fn var_int(mut self, value: i64) -> Self {
        write_var_int(&mut self.buf, value);
        self
    }

    pub fn net_str(mut self, value: &str) -> Self {
        write_net_str(&mut self.buf, value);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Walks a payload field by field, tracking the read offset.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn sm_int(&mut self) -> Result<u8, WireError> {
        let (value, consumed) = read_sm_int(self.rest())?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn bg_int(&mut self) -> Result<u16, WireError> {
        let (value, consumed) = read_bg_int(self.rest())?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn var_int(&mut self) -> Result<i64, WireError> {
        let (value, consumed) = read_var_int(self.rest())?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn net_str(&mut self) -> Result<String, WireError> {
        let (value, consumed) = read_net_str(self.rest())?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
