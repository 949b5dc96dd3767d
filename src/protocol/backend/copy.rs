//! COPY protocol backend messages.
//!
//! Only decoding is provided; COPY data streaming is left to callers.

use crate::error::Result;
use crate::protocol::codec::{ensure_consumed, read_u8, read_u16};
use crate::protocol::types::FormatCode;

/// Body of CopyInResponse, CopyOutResponse and CopyBothResponse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyResponse {
    /// Overall format (0=text, 1=binary)
    pub format: FormatCode,
    /// Per-column format codes
    pub column_formats: Vec<FormatCode>,
}

impl CopyResponse {
    /// Parse a Copy{In,Out,Both}Response message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (format_byte, rest) = read_u8(payload)?;
        let format = FormatCode::from_u16(format_byte as u16);

        let (num_columns, mut rest) = read_u16(rest)?;
        let mut column_formats = Vec::with_capacity(num_columns as usize);

        for _ in 0..num_columns {
            let (fmt, remaining) = read_u16(rest)?;
            column_formats.push(FormatCode::from_u16(fmt));
            rest = remaining;
        }
        ensure_consumed("CopyResponse", rest)?;

        Ok(Self {
            format,
            column_formats,
        })
    }

    /// Check if binary format is used.
    pub fn is_binary(&self) -> bool {
        matches!(self.format, FormatCode::Binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_binary_copy_response() {
        let payload = [1, 0, 2, 0, 1, 0, 1];
        let resp = CopyResponse::parse(&payload).unwrap();
        assert!(resp.is_binary());
        assert_eq!(resp.column_formats, vec![FormatCode::Binary, FormatCode::Binary]);
        assert!(CopyResponse::parse(&payload[..6]).is_err());
    }
}
