//! Error and notice response messages.

use crate::error::{ErrorField, Result, ServerError};
use crate::protocol::codec::{ensure_consumed, read_cstr, read_u8};

/// Parse error/notice fields from payload.
///
/// The payload is a sequence of (field code, string) pairs terminated by a zero byte.
pub fn parse_fields(payload: &[u8]) -> Result<ServerError> {
    let mut fields = Vec::new();
    let mut data = payload;

    loop {
        let (code, rest) = read_u8(data)?;
        if code == 0 {
            ensure_consumed("ErrorResponse", rest)?;
            break;
        }

        let (value, rest) = read_cstr(rest)?;
        data = rest;

        let field = ErrorField::from_code(code);
        if let ErrorField::Unknown(code) = field {
            tracing::debug!("Unknown error field type: {}", code as char);
        }
        fields.push((field, value.to_string()));
    }

    Ok(ServerError::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_receipt_order() {
        let payload = b"SERROR\0VERROR\0C42601\0Msyntax error\0P8\0Zextra\0\0";
        let err = parse_fields(payload).unwrap();

        assert_eq!(err.fields().len(), 6);
        assert_eq!(err.fields()[0].0, ErrorField::Severity);
        assert_eq!(err.code(), Some("42601"));
        assert_eq!(err.message(), Some("syntax error"));
        assert_eq!(err.position(), Some(8));
        assert_eq!(err.get(ErrorField::Unknown(b'Z')), Some("extra"));
    }

    #[test]
    fn missing_terminator_is_error() {
        assert!(parse_fields(b"SERROR\0").is_err());
    }
}
