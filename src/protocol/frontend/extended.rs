//! Extended query protocol messages.

use crate::binding::Binding;
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid, Target};

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for unnamed statement)
/// - `query`: SQL query with $1, $2, ... placeholders
/// - `param_oids`: Parameter type OIDs (0 = let server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_u32(oid);
    }
    msg.finish();
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// Each parameter carries its own format code; NULL values are sent with length -1.
pub fn write_bind(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    binding: &Binding,
    result_formats: &[FormatCode],
) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);

    msg.write_cstr(portal);
    msg.write_cstr(statement);

    let param_count = binding.len() as i16;
    msg.write_i16(param_count);
    for param in binding.iter() {
        msg.write_i16(param.format() as i16);
    }

    msg.write_i16(param_count);
    for param in binding.iter() {
        msg.write_nullable_bytes(param.value());
    }

    msg.write_i16(result_formats.len() as i16);
    for &fmt in result_formats {
        msg.write_i16(fmt as i16);
    }

    msg.finish();
}

/// Write an Execute message to run a portal.
///
/// - `portal`: Portal name
/// - `max_rows`: Maximum number of rows to return (0 = unlimited)
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_u32(max_rows);
    msg.finish();
}

/// Write a Describe message for a statement or portal.
pub fn write_describe(buf: &mut Vec<u8>, target: Target, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(target as u8);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Close message to release a statement or portal.
pub fn write_close(buf: &mut Vec<u8>, target: Target, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CLOSE);
    msg.write_u8(target as u8);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Sync message.
///
/// This ends an extended query sequence and causes:
/// - Implicit COMMIT if successful and not in explicit transaction
/// - Implicit ROLLBACK if failed and not in explicit transaction
/// - Server responds with ReadyForQuery
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::SYNC);
    msg.finish();
}

/// Write a Flush message.
///
/// Forces the server to send all pending responses without waiting for Sync.
pub fn write_flush(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::FLUSH);
    msg.finish();
}
