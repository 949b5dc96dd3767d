//! Authentication and session-level backend messages.

use zerocopy::byteorder::big_endian::U32 as U32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{ensure_consumed, read_bytes, read_cstr, read_i32, read_u8, read_u32};
use crate::protocol::types::TransactionStatus;

/// Authentication method constants.
pub mod auth_type {
    pub const OK: i32 = 0;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SCM_CREDENTIAL: i32 = 6;
    pub const GSS: i32 = 7;
    pub const GSS_CONTINUE: i32 = 8;
    pub const SSPI: i32 = 9;
    pub const SASL: i32 = 10;
    pub const SASL_CONTINUE: i32 = 11;
    pub const SASL_FINAL: i32 = 12;
}

/// Authentication message from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationMessage {
    /// Authentication successful
    Ok,
    /// Kerberos V5 authentication required
    KerberosV5,
    /// Cleartext password required
    CleartextPassword,
    /// MD5 password required (with 4-byte salt)
    Md5Password { salt: [u8; 4] },
    /// SCM credentials message required (Unix-domain sockets only)
    ScmCredential,
    /// GSS authentication
    Gss,
    /// GSS continue (with additional data)
    GssContinue { data: Vec<u8> },
    /// SSPI authentication
    Sspi,
    /// SASL authentication required (with list of mechanisms)
    Sasl { mechanisms: Vec<String> },
    /// SASL continue (with server-first-message)
    SaslContinue { data: Vec<u8> },
    /// SASL final (with server-final-message)
    SaslFinal { data: Vec<u8> },
}

impl AuthenticationMessage {
    /// Parse an Authentication message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (auth_type, rest) = read_i32(payload)?;

        let message = match auth_type {
            auth_type::OK => AuthenticationMessage::Ok,
            auth_type::KERBEROS_V5 => AuthenticationMessage::KerberosV5,
            auth_type::CLEARTEXT_PASSWORD => AuthenticationMessage::CleartextPassword,
            auth_type::MD5_PASSWORD => {
                let (salt_bytes, rest) = read_bytes(rest, 4)?;
                ensure_consumed("AuthenticationMD5Password", rest)?;
                let mut salt = [0u8; 4];
                salt.copy_from_slice(salt_bytes);
                return Ok(AuthenticationMessage::Md5Password { salt });
            }
            auth_type::SCM_CREDENTIAL => AuthenticationMessage::ScmCredential,
            auth_type::GSS => AuthenticationMessage::Gss,
            auth_type::GSS_CONTINUE => {
                return Ok(AuthenticationMessage::GssContinue { data: rest.to_vec() });
            }
            auth_type::SSPI => AuthenticationMessage::Sspi,
            auth_type::SASL => {
                let mut mechanisms = Vec::new();
                let mut data = rest;
                loop {
                    let (first, _) = read_u8(data)?;
                    if first == 0 {
                        break;
                    }
                    let (mechanism, remaining) = read_cstr(data)?;
                    mechanisms.push(mechanism.to_string());
                    data = remaining;
                }
                ensure_consumed("AuthenticationSASL", &data[1..])?;
                return Ok(AuthenticationMessage::Sasl { mechanisms });
            }
            auth_type::SASL_CONTINUE => {
                return Ok(AuthenticationMessage::SaslContinue { data: rest.to_vec() });
            }
            auth_type::SASL_FINAL => {
                return Ok(AuthenticationMessage::SaslFinal { data: rest.to_vec() });
            }
            _ => {
                return Err(Error::Decode(format!(
                    "Unknown authentication type: {}",
                    auth_type
                )));
            }
        };

        ensure_consumed("Authentication", rest)?;
        Ok(message)
    }

    /// The wire sub-code of this message.
    pub fn code(&self) -> i32 {
        match self {
            AuthenticationMessage::Ok => auth_type::OK,
            AuthenticationMessage::KerberosV5 => auth_type::KERBEROS_V5,
            AuthenticationMessage::CleartextPassword => auth_type::CLEARTEXT_PASSWORD,
            AuthenticationMessage::Md5Password { .. } => auth_type::MD5_PASSWORD,
            AuthenticationMessage::ScmCredential => auth_type::SCM_CREDENTIAL,
            AuthenticationMessage::Gss => auth_type::GSS,
            AuthenticationMessage::GssContinue { .. } => auth_type::GSS_CONTINUE,
            AuthenticationMessage::Sspi => auth_type::SSPI,
            AuthenticationMessage::Sasl { .. } => auth_type::SASL,
            AuthenticationMessage::SaslContinue { .. } => auth_type::SASL_CONTINUE,
            AuthenticationMessage::SaslFinal { .. } => auth_type::SASL_FINAL,
        }
    }
}

#[derive(FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct BackendKeyDataWire {
    pid: U32BE,
    secret_key: U32BE,
}

/// BackendKeyData message - contains process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendKeyData {
    /// Process ID of the backend
    pub process_id: u32,
    /// Secret key for cancellation
    pub secret_key: u32,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let wire = BackendKeyDataWire::read_from_bytes(payload)
            .map_err(|e| Error::Decode(format!("BackendKeyData: {e:?}")))?;
        Ok(Self {
            process_id: wire.pid.get(),
            secret_key: wire.secret_key.get(),
        })
    }
}

/// ParameterStatus message - server parameter name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterStatus {
    pub name: String,
    pub value: String,
}

impl ParameterStatus {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (name, rest) = read_cstr(payload)?;
        let (value, rest) = read_cstr(rest)?;
        ensure_consumed("ParameterStatus", rest)?;
        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// ReadyForQuery message - indicates server is ready for a new query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyForQuery {
    pub status: TransactionStatus,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (status, rest) = read_u8(payload)?;
        ensure_consumed("ReadyForQuery", rest)?;
        let status = TransactionStatus::from_byte(status).ok_or_else(|| {
            Error::Decode(format!(
                "ReadyForQuery: invalid transaction status {:#04x}",
                status
            ))
        })?;
        Ok(Self { status })
    }
}

/// NotificationResponse message - asynchronous notification from LISTEN/NOTIFY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationResponse {
    /// PID of the notifying backend
    pub pid: u32,
    pub channel: String,
    pub payload: String,
}

impl NotificationResponse {
    /// Parse a NotificationResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (pid, rest) = read_u32(payload)?;
        let (channel, rest) = read_cstr(rest)?;
        let (payload_str, rest) = read_cstr(rest)?;
        ensure_consumed("NotificationResponse", rest)?;
        Ok(Self {
            pid,
            channel: channel.to_string(),
            payload: payload_str.to_string(),
        })
    }
}

/// NegotiateProtocolVersion message - server doesn't support requested protocol features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateProtocolVersion {
    /// Newest minor protocol version supported
    pub newest_minor_version: u32,
    /// Unrecognized protocol options
    pub unrecognized_options: Vec<String>,
}

impl NegotiateProtocolVersion {
    /// Parse a NegotiateProtocolVersion message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (newest_minor_version, rest) = read_u32(payload)?;
        let (num_options, mut rest) = read_u32(rest)?;

        let mut unrecognized_options = Vec::new();
        for _ in 0..num_options {
            let (option, remaining) = read_cstr(rest)?;
            unrecognized_options.push(option.to_string());
            rest = remaining;
        }
        ensure_consumed("NegotiateProtocolVersion", rest)?;

        Ok(Self {
            newest_minor_version,
            unrecognized_options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_payload(code: i32, extra: &[u8]) -> Vec<u8> {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(extra);
        payload
    }

    #[test]
    fn parse_md5_salt() {
        let msg = AuthenticationMessage::parse(&auth_payload(5, &[1, 2, 3, 4])).unwrap();
        assert_eq!(msg, AuthenticationMessage::Md5Password { salt: [1, 2, 3, 4] });
    }

    #[test]
    fn parse_sasl_mechanisms() {
        let msg = AuthenticationMessage::parse(&auth_payload(
            10,
            b"SCRAM-SHA-256\0SCRAM-SHA-256-PLUS\0\0",
        ))
        .unwrap();
        assert_eq!(
            msg,
            AuthenticationMessage::Sasl {
                mechanisms: vec!["SCRAM-SHA-256".into(), "SCRAM-SHA-256-PLUS".into()]
            }
        );
    }

    #[test]
    fn unknown_auth_type_names_the_code() {
        let err = AuthenticationMessage::parse(&auth_payload(42, &[])).unwrap_err();
        assert!(matches!(&err, Error::Decode(msg) if msg.contains("42")));
    }

    #[test]
    fn ready_for_query_rejects_unknown_status() {
        assert_eq!(
            ReadyForQuery::parse(b"T").unwrap().status,
            TransactionStatus::InTransaction
        );
        assert!(ReadyForQuery::parse(b"X").is_err());
        assert!(ReadyForQuery::parse(b"II").is_err());
    }

    #[test]
    fn backend_key_data_requires_exact_size() {
        let mut payload = 42_u32.to_be_bytes().to_vec();
        payload.extend_from_slice(&7_u32.to_be_bytes());
        let key = BackendKeyData::parse(&payload).unwrap();
        assert_eq!((key.process_id, key.secret_key), (42, 7));

        payload.push(0);
        assert!(BackendKeyData::parse(&payload).is_err());
    }
}
