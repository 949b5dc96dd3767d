//! PostgreSQL frontend (client → server) messages.

pub mod auth;
pub mod copy;
pub mod extended;
pub mod simple;
pub mod startup;

pub use auth::{ScramClient, md5_password, write_password, write_sasl_initial_response, write_sasl_response};
pub use copy::{write_copy_data, write_copy_done, write_copy_fail};
pub use extended::{
    write_bind, write_close, write_describe, write_execute, write_flush, write_parse, write_sync,
};
pub use simple::write_query;
pub use startup::{write_cancel_request, write_startup, write_terminate};

use crate::binding::Binding;
use crate::protocol::types::{FormatCode, Oid, Target};

/// Frontend message type bytes.
pub mod msg_type {
    /// Password/SASL response (all auth response types use 'p')
    pub const PASSWORD: u8 = b'p';
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    /// Parse (extended query protocol)
    pub const PARSE: u8 = b'P';
    /// Bind (extended query protocol)
    pub const BIND: u8 = b'B';
    /// Execute (extended query protocol)
    pub const EXECUTE: u8 = b'E';
    /// Describe (extended query protocol)
    pub const DESCRIBE: u8 = b'D';
    /// Close (extended query protocol)
    pub const CLOSE: u8 = b'C';
    /// Sync (extended query protocol)
    pub const SYNC: u8 = b'S';
    /// Flush (extended query protocol)
    pub const FLUSH: u8 = b'H';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// CopyFail
    pub const COPY_FAIL: u8 = b'f';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontendMessage {
    /// StartupMessage with (name, value) parameters
    Startup { params: Vec<(String, String)> },
    /// CancelRequest, sent on its own connection
    CancelRequest { process_id: u32, secret_key: u32 },
    Query(String),
    Parse {
        name: String,
        query: String,
        param_oids: Vec<Oid>,
    },
    Bind {
        portal: String,
        statement: String,
        binding: Binding,
        result_formats: Vec<FormatCode>,
    },
    Describe { target: Target, name: String },
    Execute { portal: String, max_rows: u32 },
    Close { target: Target, name: String },
    Sync,
    Flush,
    Terminate,
    /// PasswordMessage (cleartext or MD5-hashed)
    Password(String),
    SaslInitialResponse { mechanism: String, data: Vec<u8> },
    SaslResponse(Vec<u8>),
    CopyData(Vec<u8>),
    CopyDone,
    CopyFail(String),
}

impl FrontendMessage {
    /// Append the wire encoding of this message to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            FrontendMessage::Startup { params } => write_startup(buf, params),
            FrontendMessage::CancelRequest {
                process_id,
                secret_key,
            } => write_cancel_request(buf, *process_id, *secret_key),
            FrontendMessage::Query(sql) => write_query(buf, sql),
            FrontendMessage::Parse {
                name,
                query,
                param_oids,
            } => write_parse(buf, name, query, param_oids),
            FrontendMessage::Bind {
                portal,
                statement,
                binding,
                result_formats,
            } => write_bind(buf, portal, statement, binding, result_formats),
            FrontendMessage::Describe { target, name } => write_describe(buf, *target, name),
            FrontendMessage::Execute { portal, max_rows } => write_execute(buf, portal, *max_rows),
            FrontendMessage::Close { target, name } => write_close(buf, *target, name),
            FrontendMessage::Sync => write_sync(buf),
            FrontendMessage::Flush => write_flush(buf),
            FrontendMessage::Terminate => write_terminate(buf),
            FrontendMessage::Password(password) => write_password(buf, password),
            FrontendMessage::SaslInitialResponse { mechanism, data } => {
                write_sasl_initial_response(buf, mechanism, data)
            }
            FrontendMessage::SaslResponse(data) => write_sasl_response(buf, data),
            FrontendMessage::CopyData(data) => write_copy_data(buf, data),
            FrontendMessage::CopyDone => write_copy_done(buf),
            FrontendMessage::CopyFail(reason) => write_copy_fail(buf, reason),
        }
    }

    /// Returns true if the server answers this message with ReadyForQuery.
    pub fn expects_ready(&self) -> bool {
        matches!(self, FrontendMessage::Query(_) | FrontendMessage::Sync)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            FrontendMessage::Startup { .. } => "StartupMessage",
            FrontendMessage::CancelRequest { .. } => "CancelRequest",
            FrontendMessage::Query(_) => "Query",
            FrontendMessage::Parse { .. } => "Parse",
            FrontendMessage::Bind { .. } => "Bind",
            FrontendMessage::Describe { .. } => "Describe",
            FrontendMessage::Execute { .. } => "Execute",
            FrontendMessage::Close { .. } => "Close",
            FrontendMessage::Sync => "Sync",
            FrontendMessage::Flush => "Flush",
            FrontendMessage::Terminate => "Terminate",
            FrontendMessage::Password(_) => "PasswordMessage",
            FrontendMessage::SaslInitialResponse { .. } => "SASLInitialResponse",
            FrontendMessage::SaslResponse(_) => "SASLResponse",
            FrontendMessage::CopyData(_) => "CopyData",
            FrontendMessage::CopyDone => "CopyDone",
            FrontendMessage::CopyFail(_) => "CopyFail",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_concatenates_frames() {
        let mut buf = Vec::new();
        for msg in [
            FrontendMessage::Parse {
                name: "s".into(),
                query: "SELECT $1".into(),
                param_oids: vec![23],
            },
            FrontendMessage::Describe {
                target: Target::Statement,
                name: "s".into(),
            },
            FrontendMessage::Sync,
        ] {
            msg.encode(&mut buf);
        }

        let mut tags = Vec::new();
        let mut rest = &buf[..];
        while !rest.is_empty() {
            let len = i32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
            tags.push(rest[0]);
            rest = &rest[1 + len..];
        }
        assert_eq!(tags, vec![b'P', b'D', b'S']);
    }

    #[test]
    fn ready_boundaries() {
        assert!(FrontendMessage::Query("SELECT 1".into()).expects_ready());
        assert!(FrontendMessage::Sync.expects_ready());
        assert!(!FrontendMessage::Flush.expects_ready());
        assert!(!FrontendMessage::Terminate.expects_ready());
    }
}
