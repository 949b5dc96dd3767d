//! Error types for pgconduit.

use thiserror::Error;

/// Result type for pgconduit operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Field type of an ErrorResponse/NoticeResponse entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorField {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG (localized)
    Severity,
    /// Severity, never localized
    SeverityNonLocalized,
    /// SQLSTATE error code (5 characters)
    Code,
    /// Primary human-readable message
    Message,
    /// Optional secondary message
    Detail,
    /// Suggestion for fixing the problem
    Hint,
    /// Cursor position in the original query string (1-based)
    Position,
    /// Cursor position in an internally generated command
    InternalPosition,
    /// Text of the failed internally generated command
    InternalQuery,
    /// Context in which the error occurred
    Where,
    SchemaName,
    TableName,
    ColumnName,
    DataTypeName,
    ConstraintName,
    /// Source file name where the error was reported
    File,
    /// Source line number where the error was reported
    Line,
    /// Source routine name reporting the error
    Routine,
    /// Any field code this crate does not know about
    Unknown(u8),
}

impl ErrorField {
    /// Map a wire field-type code to its field.
    pub fn from_code(code: u8) -> Self {
        match code {
            b'S' => ErrorField::Severity,
            b'V' => ErrorField::SeverityNonLocalized,
            b'C' => ErrorField::Code,
            b'M' => ErrorField::Message,
            b'D' => ErrorField::Detail,
            b'H' => ErrorField::Hint,
            b'P' => ErrorField::Position,
            b'p' => ErrorField::InternalPosition,
            b'q' => ErrorField::InternalQuery,
            b'W' => ErrorField::Where,
            b's' => ErrorField::SchemaName,
            b't' => ErrorField::TableName,
            b'c' => ErrorField::ColumnName,
            b'd' => ErrorField::DataTypeName,
            b'n' => ErrorField::ConstraintName,
            b'F' => ErrorField::File,
            b'L' => ErrorField::Line,
            b'R' => ErrorField::Routine,
            other => ErrorField::Unknown(other),
        }
    }

    /// The wire field-type code.
    pub fn code(self) -> u8 {
        match self {
            ErrorField::Severity => b'S',
            ErrorField::SeverityNonLocalized => b'V',
            ErrorField::Code => b'C',
            ErrorField::Message => b'M',
            ErrorField::Detail => b'D',
            ErrorField::Hint => b'H',
            ErrorField::Position => b'P',
            ErrorField::InternalPosition => b'p',
            ErrorField::InternalQuery => b'q',
            ErrorField::Where => b'W',
            ErrorField::SchemaName => b's',
            ErrorField::TableName => b't',
            ErrorField::ColumnName => b'c',
            ErrorField::DataTypeName => b'd',
            ErrorField::ConstraintName => b'n',
            ErrorField::File => b'F',
            ErrorField::Line => b'L',
            ErrorField::Routine => b'R',
            ErrorField::Unknown(code) => code,
        }
    }
}

/// Fields of an ErrorResponse or NoticeResponse, in the order the server sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerError {
    fields: Vec<(ErrorField, String)>,
}

impl ServerError {
    /// Create from an ordered field list.
    pub fn new(fields: Vec<(ErrorField, String)>) -> Self {
        Self { fields }
    }

    /// All fields in receipt order.
    pub fn fields(&self) -> &[(ErrorField, String)] {
        &self.fields
    }

    /// Value of the first occurrence of `field`.
    pub fn get(&self, field: ErrorField) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, value)| value.as_str())
    }

    /// Severity, preferring the non-localized variant.
    pub fn severity(&self) -> Option<&str> {
        self.get(ErrorField::SeverityNonLocalized)
            .or_else(|| self.get(ErrorField::Severity))
    }

    /// SQLSTATE code.
    pub fn code(&self) -> Option<&str> {
        self.get(ErrorField::Code)
    }

    /// Primary message.
    pub fn message(&self) -> Option<&str> {
        self.get(ErrorField::Message)
    }

    pub fn detail(&self) -> Option<&str> {
        self.get(ErrorField::Detail)
    }

    pub fn hint(&self) -> Option<&str> {
        self.get(ErrorField::Hint)
    }

    /// Cursor position in the query string (1-based).
    pub fn position(&self) -> Option<u32> {
        self.get(ErrorField::Position).and_then(|p| p.parse().ok())
    }

    /// Returns true for FATAL and PANIC severities, after which the server closes the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity(), Some("FATAL") | Some("PANIC"))
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = self.severity() {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = self.message() {
            write!(f, "{}", message)?;
        }
        if let Some(code) = self.code() {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = self.detail() {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = self.hint() {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for pgconduit.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ServerError),

    /// Malformed bytes on the wire (bad framing, unknown tag, invalid sub-code)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Server sent a well-formed message that is invalid at this point of the protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Operation not valid in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid usage (e.g., a submission without a Sync boundary)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Connection was closed by `close()`
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection failed and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,
}

impl From<core::convert::Infallible> for Error {
    fn from(never: core::convert::Infallible) -> Self {
        match never {}
    }
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::Decode(_) | Error::Protocol(_) | Error::ConnectionBroken => true,
            Error::Server(fields) => fields.is_fatal(),
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_codes_round_trip() {
        for code in [b'S', b'V', b'C', b'M', b'D', b'H', b'P', b'p', b'q', b'W', b's', b't',
            b'c', b'd', b'n', b'F', b'L', b'R', b'Z']
        {
            assert_eq!(ErrorField::from_code(code).code(), code);
        }
        assert_eq!(ErrorField::from_code(b'Z'), ErrorField::Unknown(b'Z'));
    }

    #[test]
    fn fatal_server_error_breaks_connection() {
        let fatal = ServerError::new(vec![
            (ErrorField::Severity, "FATAL".into()),
            (ErrorField::Code, "57P01".into()),
        ]);
        assert!(Error::Server(fatal).is_connection_broken());

        let plain = ServerError::new(vec![(ErrorField::Severity, "ERROR".into())]);
        let err = Error::Server(plain);
        assert!(!err.is_connection_broken());
        assert_eq!(err.sqlstate(), None);
    }

    #[test]
    fn display_includes_code_and_detail() {
        let err = ServerError::new(vec![
            (ErrorField::Severity, "ERROR".into()),
            (ErrorField::Message, "relation \"t\" does not exist".into()),
            (ErrorField::Code, "42P01".into()),
            (ErrorField::Detail, "nope".into()),
        ]);
        assert_eq!(
            err.to_string(),
            "ERROR: relation \"t\" does not exist (SQLSTATE 42P01)\nDETAIL: nope"
        );
    }
}
