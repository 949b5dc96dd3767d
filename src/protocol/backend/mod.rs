//! PostgreSQL backend (server → client) messages.

pub mod auth;
pub mod copy;
pub mod error;
pub mod extended;
pub mod query;

pub use auth::{
    AuthenticationMessage, BackendKeyData, NegotiateProtocolVersion, NotificationResponse,
    ParameterStatus, ReadyForQuery,
};
pub use copy::CopyResponse;
pub use extended::{FunctionCallResponse, ParameterDescription};
pub use query::{CommandComplete, DataRow, FieldDescription, RowDescription};

use crate::error::{Error, Result, ServerError};
use crate::protocol::codec::{MessageBuilder, ensure_consumed};
use crate::protocol::types::{Oid, TransactionStatus};

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// CloseComplete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// ParameterDescription
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// NoData
    pub const NO_DATA: u8 = b'n';
    /// PortalSuspended
    pub const PORTAL_SUSPENDED: u8 = b's';
    /// CopyInResponse
    pub const COPY_IN_RESPONSE: u8 = b'G';
    /// CopyOutResponse
    pub const COPY_OUT_RESPONSE: u8 = b'H';
    /// CopyBothResponse
    pub const COPY_BOTH_RESPONSE: u8 = b'W';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// FunctionCallResponse
    pub const FUNCTION_CALL_RESPONSE: u8 = b'V';
    /// NegotiateProtocolVersion
    pub const NEGOTIATE_PROTOCOL_VERSION: u8 = b'v';
}

/// A decoded message from the PostgreSQL server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    Authentication(AuthenticationMessage),
    BackendKeyData(BackendKeyData),
    ParameterStatus(ParameterStatus),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
    DataRow(DataRow),
    CommandComplete(CommandComplete),
    EmptyQueryResponse,
    ErrorResponse(ServerError),
    NoticeResponse(ServerError),
    NotificationResponse(NotificationResponse),
    ParseComplete,
    BindComplete,
    CloseComplete,
    ParameterDescription(ParameterDescription),
    NoData,
    PortalSuspended,
    CopyInResponse(CopyResponse),
    CopyOutResponse(CopyResponse),
    CopyBothResponse(CopyResponse),
    CopyData(Vec<u8>),
    CopyDone,
    FunctionCallResponse(FunctionCallResponse),
    NegotiateProtocolVersion(NegotiateProtocolVersion),
}

impl BackendMessage {
    /// Decode a message from its type byte and complete payload.
    pub fn parse(type_byte: u8, payload: &[u8]) -> Result<Self> {
        let message = match type_byte {
            msg_type::AUTHENTICATION => {
                BackendMessage::Authentication(AuthenticationMessage::parse(payload)?)
            }
            msg_type::BACKEND_KEY_DATA => {
                BackendMessage::BackendKeyData(BackendKeyData::parse(payload)?)
            }
            msg_type::PARAMETER_STATUS => {
                BackendMessage::ParameterStatus(ParameterStatus::parse(payload)?)
            }
            msg_type::READY_FOR_QUERY => {
                BackendMessage::ReadyForQuery(ReadyForQuery::parse(payload)?)
            }
            msg_type::ROW_DESCRIPTION => {
                BackendMessage::RowDescription(RowDescription::parse(payload)?)
            }
            msg_type::DATA_ROW => BackendMessage::DataRow(DataRow::parse(payload)?),
            msg_type::COMMAND_COMPLETE => {
                BackendMessage::CommandComplete(CommandComplete::parse(payload)?)
            }
            msg_type::EMPTY_QUERY_RESPONSE => {
                ensure_consumed("EmptyQueryResponse", payload)?;
                BackendMessage::EmptyQueryResponse
            }
            msg_type::ERROR_RESPONSE => BackendMessage::ErrorResponse(error::parse_fields(payload)?),
            msg_type::NOTICE_RESPONSE => {
                BackendMessage::NoticeResponse(error::parse_fields(payload)?)
            }
            msg_type::NOTIFICATION_RESPONSE => {
                BackendMessage::NotificationResponse(NotificationResponse::parse(payload)?)
            }
            msg_type::PARSE_COMPLETE => {
                ensure_consumed("ParseComplete", payload)?;
                BackendMessage::ParseComplete
            }
            msg_type::BIND_COMPLETE => {
                ensure_consumed("BindComplete", payload)?;
                BackendMessage::BindComplete
            }
            msg_type::CLOSE_COMPLETE => {
                ensure_consumed("CloseComplete", payload)?;
                BackendMessage::CloseComplete
            }
            msg_type::PARAMETER_DESCRIPTION => {
                BackendMessage::ParameterDescription(ParameterDescription::parse(payload)?)
            }
            msg_type::NO_DATA => {
                ensure_consumed("NoData", payload)?;
                BackendMessage::NoData
            }
            msg_type::PORTAL_SUSPENDED => {
                ensure_consumed("PortalSuspended", payload)?;
                BackendMessage::PortalSuspended
            }
            msg_type::COPY_IN_RESPONSE => {
                BackendMessage::CopyInResponse(CopyResponse::parse(payload)?)
            }
            msg_type::COPY_OUT_RESPONSE => {
                BackendMessage::CopyOutResponse(CopyResponse::parse(payload)?)
            }
            msg_type::COPY_BOTH_RESPONSE => {
                BackendMessage::CopyBothResponse(CopyResponse::parse(payload)?)
            }
            msg_type::COPY_DATA => BackendMessage::CopyData(payload.to_vec()),
            msg_type::COPY_DONE => {
                ensure_consumed("CopyDone", payload)?;
                BackendMessage::CopyDone
            }
            msg_type::FUNCTION_CALL_RESPONSE => {
                BackendMessage::FunctionCallResponse(FunctionCallResponse::parse(payload)?)
            }
            msg_type::NEGOTIATE_PROTOCOL_VERSION => {
                BackendMessage::NegotiateProtocolVersion(NegotiateProtocolVersion::parse(payload)?)
            }
            other => {
                return Err(Error::Decode(format!(
                    "Unknown message type: '{}' ({:#04x})",
                    other.escape_ascii(),
                    other
                )));
            }
        };
        Ok(message)
    }

    /// Type byte of this message.
    pub fn type_byte(&self) -> u8 {
        match self {
            BackendMessage::Authentication(_) => msg_type::AUTHENTICATION,
            BackendMessage::BackendKeyData(_) => msg_type::BACKEND_KEY_DATA,
            BackendMessage::ParameterStatus(_) => msg_type::PARAMETER_STATUS,
            BackendMessage::ReadyForQuery(_) => msg_type::READY_FOR_QUERY,
            BackendMessage::RowDescription(_) => msg_type::ROW_DESCRIPTION,
            BackendMessage::DataRow(_) => msg_type::DATA_ROW,
            BackendMessage::CommandComplete(_) => msg_type::COMMAND_COMPLETE,
            BackendMessage::EmptyQueryResponse => msg_type::EMPTY_QUERY_RESPONSE,
            BackendMessage::ErrorResponse(_) => msg_type::ERROR_RESPONSE,
            BackendMessage::NoticeResponse(_) => msg_type::NOTICE_RESPONSE,
            BackendMessage::NotificationResponse(_) => msg_type::NOTIFICATION_RESPONSE,
            BackendMessage::ParseComplete => msg_type::PARSE_COMPLETE,
            BackendMessage::BindComplete => msg_type::BIND_COMPLETE,
            BackendMessage::CloseComplete => msg_type::CLOSE_COMPLETE,
            BackendMessage::ParameterDescription(_) => msg_type::PARAMETER_DESCRIPTION,
            BackendMessage::NoData => msg_type::NO_DATA,
            BackendMessage::PortalSuspended => msg_type::PORTAL_SUSPENDED,
            BackendMessage::CopyInResponse(_) => msg_type::COPY_IN_RESPONSE,
            BackendMessage::CopyOutResponse(_) => msg_type::COPY_OUT_RESPONSE,
            BackendMessage::CopyBothResponse(_) => msg_type::COPY_BOTH_RESPONSE,
            BackendMessage::CopyData(_) => msg_type::COPY_DATA,
            BackendMessage::CopyDone => msg_type::COPY_DONE,
            BackendMessage::FunctionCallResponse(_) => msg_type::FUNCTION_CALL_RESPONSE,
            BackendMessage::NegotiateProtocolVersion(_) => msg_type::NEGOTIATE_PROTOCOL_VERSION,
        }
    }

    /// Check if this is an async message (can arrive at any time).
    pub fn is_async(&self) -> bool {
        matches!(
            self,
            BackendMessage::NoticeResponse(_)
                | BackendMessage::NotificationResponse(_)
                | BackendMessage::ParameterStatus(_)
        )
    }

    /// Transaction status if this is a ReadyForQuery.
    pub fn ready_status(&self) -> Option<TransactionStatus> {
        match self {
            BackendMessage::ReadyForQuery(ready) => Some(ready.status),
            _ => None,
        }
    }

    /// Encode this message in wire format.
    ///
    /// Used by scripted servers in tests; a client never sends backend messages.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, self.type_byte());
        match self {
            BackendMessage::Authentication(auth) => {
                msg.write_i32(auth.code());
                match auth {
                    AuthenticationMessage::Md5Password { salt } => msg.write_bytes(salt),
                    AuthenticationMessage::GssContinue { data }
                    | AuthenticationMessage::SaslContinue { data }
                    | AuthenticationMessage::SaslFinal { data } => msg.write_bytes(data),
                    AuthenticationMessage::Sasl { mechanisms } => {
                        for mechanism in mechanisms {
                            msg.write_cstr(mechanism);
                        }
                        msg.write_u8(0);
                    }
                    _ => {}
                }
            }
            BackendMessage::BackendKeyData(key) => {
                msg.write_u32(key.process_id);
                msg.write_u32(key.secret_key);
            }
            BackendMessage::ParameterStatus(status) => {
                msg.write_cstr(&status.name);
                msg.write_cstr(&status.value);
            }
            BackendMessage::ReadyForQuery(ready) => msg.write_u8(ready.status as u8),
            BackendMessage::RowDescription(desc) => {
                msg.write_u16(desc.len() as u16);
                for field in desc.iter() {
                    msg.write_cstr(&field.name);
                    msg.write_u32(field.table_oid);
                    msg.write_i16(field.column_id);
                    msg.write_u32(field.type_oid);
                    msg.write_i16(field.type_size);
                    msg.write_i32(field.type_modifier);
                    msg.write_u16(field.format as u16);
                }
            }
            BackendMessage::DataRow(row) => {
                msg.write_u16(row.len() as u16);
                for value in row.iter() {
                    msg.write_nullable_bytes(value);
                }
            }
            BackendMessage::CommandComplete(complete) => msg.write_cstr(complete.tag()),
            BackendMessage::ErrorResponse(fields) | BackendMessage::NoticeResponse(fields) => {
                for (field, value) in fields.fields() {
                    msg.write_u8(field.code());
                    msg.write_cstr(value);
                }
                msg.write_u8(0);
            }
            BackendMessage::NotificationResponse(notification) => {
                msg.write_u32(notification.pid);
                msg.write_cstr(&notification.channel);
                msg.write_cstr(&notification.payload);
            }
            BackendMessage::ParameterDescription(desc) => {
                msg.write_u16(desc.len() as u16);
                for &oid in desc.oids() {
                    msg.write_u32(oid);
                }
            }
            BackendMessage::CopyInResponse(resp)
            | BackendMessage::CopyOutResponse(resp)
            | BackendMessage::CopyBothResponse(resp) => {
                msg.write_u8(resp.format as u8);
                msg.write_u16(resp.column_formats.len() as u16);
                for &fmt in &resp.column_formats {
                    msg.write_u16(fmt as u16);
                }
            }
            BackendMessage::CopyData(data) => msg.write_bytes(data),
            BackendMessage::FunctionCallResponse(resp) => {
                msg.write_nullable_bytes(resp.value.as_deref())
            }
            BackendMessage::NegotiateProtocolVersion(negotiate) => {
                msg.write_u32(negotiate.newest_minor_version);
                msg.write_u32(negotiate.unrecognized_options.len() as u32);
                for option in &negotiate.unrecognized_options {
                    msg.write_cstr(option);
                }
            }
            BackendMessage::EmptyQueryResponse
            | BackendMessage::ParseComplete
            | BackendMessage::BindComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData
            | BackendMessage::PortalSuspended
            | BackendMessage::CopyDone => {}
        }
        msg.finish();
    }
}

impl ReadyForQuery {
    /// Convenience constructor for a ReadyForQuery message.
    pub fn message(status: TransactionStatus) -> BackendMessage {
        BackendMessage::ReadyForQuery(ReadyForQuery { status })
    }
}

impl RowDescription {
    /// Type OIDs of all fields.
    pub fn type_oids(&self) -> Vec<Oid> {
        self.iter().map(|f| f.type_oid).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorField;

    fn frame(msg: &BackendMessage) -> (u8, Vec<u8>) {
        let mut buf = Vec::new();
        msg.encode(&mut buf);
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(len, buf.len() - 1);
        (buf[0], buf[5..].to_vec())
    }

    #[test]
    fn unknown_tag_names_the_byte() {
        let err = BackendMessage::parse(b'?', &[]).unwrap_err();
        assert!(matches!(&err, Error::Decode(msg) if msg.contains('?')));
        assert!(err.is_connection_broken());
    }

    #[test]
    fn unit_messages_reject_payload() {
        assert_eq!(
            BackendMessage::parse(msg_type::NO_DATA, &[]).unwrap(),
            BackendMessage::NoData
        );
        assert!(BackendMessage::parse(msg_type::NO_DATA, &[0]).is_err());
    }

    #[test]
    fn encode_then_parse_error_response() {
        let msg = BackendMessage::ErrorResponse(ServerError::new(vec![
            (ErrorField::Severity, "ERROR".into()),
            (ErrorField::Code, "22012".into()),
            (ErrorField::Message, "division by zero".into()),
        ]));
        let (tag, payload) = frame(&msg);
        assert_eq!(tag, b'E');
        assert_eq!(BackendMessage::parse(tag, &payload).unwrap(), msg);
    }

    #[test]
    fn async_classification() {
        let notice = BackendMessage::NoticeResponse(ServerError::default());
        assert!(notice.is_async());
        assert!(!BackendMessage::ErrorResponse(ServerError::default()).is_async());
        assert_eq!(
            ReadyForQuery::message(TransactionStatus::Failed).ready_status(),
            Some(TransactionStatus::Failed)
        );
    }
}
