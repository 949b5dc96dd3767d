//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.

use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&value, rest)) => Ok((value, rest)),
        None => Err(Error::Decode("read_u8: empty buffer".into())),
    }
}

/// Read 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    let (bytes, rest) = read_bytes(data, 2)?;
    let value = I16BE::read_from_bytes(bytes)
        .map_err(|e| Error::Decode(format!("read_i16: {e:?}")))?
        .get();
    Ok((value, rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (bytes, rest) = read_bytes(data, 2)?;
    let value = U16BE::read_from_bytes(bytes)
        .map_err(|e| Error::Decode(format!("read_u16: {e:?}")))?
        .get();
    Ok((value, rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (bytes, rest) = read_bytes(data, 4)?;
    let value = I32BE::read_from_bytes(bytes)
        .map_err(|e| Error::Decode(format!("read_i32: {e:?}")))?
        .get();
    Ok((value, rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (bytes, rest) = read_bytes(data, 4)?;
    let value = U32BE::read_from_bytes(bytes)
        .map_err(|e| Error::Decode(format!("read_u32: {e:?}")))?
        .get();
    Ok((value, rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    data.split_at_checked(len).ok_or_else(|| {
        Error::Decode(format!(
            "read_bytes: buffer too short: {} < {}",
            data.len(),
            len
        ))
    })
}

/// Read a length-prefixed value where -1 means NULL (DataRow, FunctionCallResponse).
#[inline]
pub fn read_nullable_bytes(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    let (len, rest) = read_i32(data)?;
    if len == -1 {
        return Ok((None, rest));
    }
    let len = usize::try_from(len)
        .map_err(|_| Error::Decode(format!("invalid value length: {}", len)))?;
    let (value, rest) = read_bytes(rest, len)?;
    Ok((Some(value), rest))
}

/// Read null-terminated string (PostgreSQL String type).
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Decode(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Decode(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Fail if a message payload was not fully consumed by its parser.
#[inline]
pub fn ensure_consumed(message: &str, rest: &[u8]) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Error::Decode(format!(
            "{}: {} trailing bytes in payload",
            message,
            rest.len()
        )))
    }
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian signed integer.
#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 2-byte big-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write a length-prefixed value, -1 for NULL.
#[inline]
pub fn write_nullable_bytes(out: &mut Vec<u8>, data: Option<&[u8]>) {
    match data {
        Some(bytes) => {
            write_i32(out, bytes.len() as i32);
            write_bytes(out, bytes);
        }
        None => write_i32(out, -1),
    }
}

/// Write null-terminated string (PostgreSQL String type).
#[inline]
pub fn write_cstring(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s);
    out.push(0);
}

/// Write null-terminated string from &str.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    write_cstring(out, s.as_bytes());
}

/// Reject text that cannot be sent as a null-terminated string.
pub fn check_cstr(what: &str, s: &str) -> Result<()> {
    match memchr::memchr(0, s.as_bytes()) {
        Some(offset) => Err(Error::InvalidUsage(format!(
            "{} contains a NUL byte at offset {}",
            what, offset
        ))),
        None => Ok(()),
    }
}

/// Message builder helper that handles the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Start building an untagged message (StartupMessage, CancelRequest).
    pub fn new_untagged(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Get mutable access to the underlying buffer.
    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    pub fn write_u16(&mut self, value: u16) {
        write_u16(self.buf, value);
    }

    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    pub fn write_nullable_bytes(&mut self, data: Option<&[u8]>) {
        write_nullable_bytes(self.buf, data);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}
