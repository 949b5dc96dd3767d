//! Resumable framing of the inbound byte stream.

use crate::error::{Error, Result};
use crate::protocol::backend::BackendMessage;

/// Upper bound on a single message length accepted from the server.
pub const MAX_MESSAGE_LEN: usize = 1 << 30;

/// Size of the type byte plus the length field.
const HEADER_LEN: usize = 5;

/// Splits a byte stream into backend messages.
///
/// Bytes may arrive in arbitrary chunks; an incomplete tail is retained until
/// the rest of the message is fed.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buf: Vec<u8>,
    pos: usize,
}

impl MessageDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(8192),
            pos: 0,
        }
    }

    /// Append bytes read from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(data);
    }

    /// Buffer the socket reads into.
    ///
    /// Consumed bytes are discarded first, so callers can use it with `read_buf`.
    pub fn read_buffer(&mut self) -> &mut Vec<u8> {
        self.compact();
        &mut self.buf
    }

    /// Number of buffered bytes not yet decoded.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Decode the next complete message.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn decode(&mut self) -> Result<Option<BackendMessage>> {
        let data = &self.buf[self.pos..];
        if data.len() < HEADER_LEN {
            return Ok(None);
        }

        let type_byte = data[0];
        let length = i32::from_be_bytes([data[1], data[2], data[3], data[4]]);
        let length = usize::try_from(length)
            .ok()
            .filter(|len| *len >= 4)
            .ok_or_else(|| {
                Error::Decode(format!(
                    "invalid message length {} for type '{}'",
                    length,
                    type_byte.escape_ascii()
                ))
            })?;
        if length > MAX_MESSAGE_LEN {
            return Err(Error::Decode(format!(
                "message length {} exceeds limit {}",
                length, MAX_MESSAGE_LEN
            )));
        }

        let total = 1 + length;
        if data.len() < total {
            return Ok(None);
        }

        let message = BackendMessage::parse(type_byte, &data[HEADER_LEN..total])?;
        self.pos += total;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }

        tracing::trace!(type_byte = %type_byte.escape_ascii(), length, "decoded backend message");
        Ok(Some(message))
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::backend::{CommandComplete, DataRow, ReadyForQuery};
    use crate::protocol::types::TransactionStatus;

    fn sample() -> (Vec<BackendMessage>, Vec<u8>) {
        let messages = vec![
            BackendMessage::DataRow(DataRow::new(vec![Some(b"1".to_vec()), None])),
            BackendMessage::CommandComplete(CommandComplete::from_tag("SELECT 1")),
            BackendMessage::EmptyQueryResponse,
            ReadyForQuery::message(TransactionStatus::Idle),
        ];
        let mut bytes = Vec::new();
        for msg in &messages {
            msg.encode(&mut bytes);
        }
        (messages, bytes)
    }

    fn drain(decoder: &mut MessageDecoder, out: &mut Vec<BackendMessage>) {
        while let Some(msg) = decoder.decode().unwrap() {
            out.push(msg);
        }
    }

    #[test]
    fn any_split_point_yields_same_messages() {
        let (expected, bytes) = sample();
        for split in 0..=bytes.len() {
            let mut decoder = MessageDecoder::new();
            let mut decoded = Vec::new();
            decoder.feed(&bytes[..split]);
            drain(&mut decoder, &mut decoded);
            decoder.feed(&bytes[split..]);
            drain(&mut decoder, &mut decoded);
            assert_eq!(decoded, expected, "split at {}", split);
            assert_eq!(decoder.pending_bytes(), 0);
        }
    }

    #[test]
    fn byte_at_a_time() {
        let (expected, bytes) = sample();
        let mut decoder = MessageDecoder::new();
        let mut decoded = Vec::new();
        for byte in &bytes {
            decoder.feed(std::slice::from_ref(byte));
            drain(&mut decoder, &mut decoded);
        }
        assert_eq!(decoded, expected);
    }

    #[test]
    fn length_below_four_is_rejected() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(&[b'Z', 0, 0, 0, 3, b'I']);
        assert!(matches!(decoder.decode(), Err(Error::Decode(_))));
    }

    #[test]
    fn partial_header_waits() {
        let mut decoder = MessageDecoder::new();
        decoder.feed(&[b'Z', 0, 0]);
        assert!(decoder.decode().unwrap().is_none());
        assert_eq!(decoder.pending_bytes(), 3);
    }
}
