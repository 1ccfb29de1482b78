//! Frontend (client → server) messages.

use super::codec::MessageBuilder;
use super::types::Oid;
use crate::statement::Param;

/// Frontend message type bytes.
pub mod msg_type {
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
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for unnamed statement)
/// - `query`: SQL query with placeholders
/// - `param_oids`: Parameter type OIDs (0 = let server infer)
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_i16(param_oids.len() as i16);
    for &oid in param_oids {
        msg.write_i32(oid as i32);
    }
    msg.finish();
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// Carries the declared parameter type OIDs alongside the encoded values,
/// followed by length-prefixed value data (-1 length = NULL) and zero result
/// format codes (server default).
pub fn write_bind(buf: &mut Vec<u8>, portal: &str, statement: &str, params: &[Param]) {
    let mut msg = MessageBuilder::new(buf, msg_type::BIND);

    msg.write_cstr(portal);
    msg.write_cstr(statement);

    // Declared parameter types
    msg.write_i16(params.len() as i16);
    for param in params {
        msg.write_i32(param.type_oid as i32);
    }

    // Encoded parameter values
    msg.write_i16(params.len() as i16);
    for param in params {
        match &param.value {
            Some(value) => {
                msg.write_i32(value.len() as i32);
                msg.write_bytes(value);
            }
            None => msg.write_i32(-1),
        }
    }

    // Result format codes (empty = server default)
    msg.write_i16(0);

    msg.finish();
}

/// Write an Execute message to run a portal.
///
/// - `portal`: Portal name
/// - `max_rows`: Maximum number of rows to return (0 = unlimited)
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_i32(max_rows as i32);
    msg.finish();
}

/// Write a Describe message to get metadata.
///
/// - `describe_type`: 'S' for statement, 'P' for portal
/// - `name`: Statement or portal name
pub fn write_describe(buf: &mut Vec<u8>, describe_type: u8, name: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::DESCRIBE);
    msg.write_u8(describe_type);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Describe message for a statement.
pub fn write_describe_statement(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'S', name);
}

/// Write a Close message to release a statement or portal.
///
/// - `close_type`: 'S' for statement, 'P' for portal
/// - `name`: Statement or portal name
pub fn write_close(buf: &mut Vec<u8>, close_type: u8, name: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::CLOSE);
    msg.write_u8(close_type);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Close message for a portal.
pub fn write_close_portal(buf: &mut Vec<u8>, name: &str) {
    write_close(buf, b'P', name);
}

/// Write a Close message for a statement.
pub fn write_close_statement(buf: &mut Vec<u8>, name: &str) {
    write_close(buf, b'S', name);
}

/// Write a Sync message.
///
/// Ends an extended query sequence; the server responds with ReadyForQuery
/// once all preceding requests are answered.
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::SYNC);
    msg.finish();
}

/// Write a Flush message.
///
/// Forces the server to send all pending responses without waiting for Sync.
pub fn write_flush(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::FLUSH);
    msg.finish();
}

/// Write a Terminate message for graceful disconnect.
pub fn write_terminate(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::TERMINATE);
    msg.finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_layout() {
        let mut buf = Vec::new();
        let params = [
            Param::new(23, b"42".to_vec()),
            Param::null(25),
        ];
        write_bind(&mut buf, "portal1", "stmt1", &params);

        assert_eq!(buf[0], b'B');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);

        // Payload starts with the two names
        assert_eq!(&buf[5..13], b"portal1\0");
        assert_eq!(&buf[13..19], b"stmt1\0");
        // Declared type count then OIDs
        assert_eq!(&buf[19..21], &2_i16.to_be_bytes());
        assert_eq!(&buf[21..25], &23_i32.to_be_bytes());
        assert_eq!(&buf[25..29], &25_i32.to_be_bytes());
        // Value count, "42", then NULL marker
        assert_eq!(&buf[29..31], &2_i16.to_be_bytes());
        assert_eq!(&buf[31..35], &2_i32.to_be_bytes());
        assert_eq!(&buf[35..37], b"42");
        assert_eq!(&buf[37..41], &(-1_i32).to_be_bytes());
        // No result format codes
        assert_eq!(&buf[41..43], &0_i16.to_be_bytes());
        assert_eq!(buf.len(), 43);
    }

    #[test]
    fn execute_unlimited() {
        let mut buf = Vec::new();
        write_execute(&mut buf, "", 0);

        assert_eq!(buf[0], b'E');
        // Length: 4 + 1 (empty string + null) + 4 (max_rows) = 9
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len, 9);
        assert_eq!(&buf[6..10], &0_i32.to_be_bytes());
    }

    #[test]
    fn close_portal_kind() {
        let mut buf = Vec::new();
        write_close_portal(&mut buf, "p1");

        assert_eq!(buf[0], b'C');
        assert_eq!(buf[5], b'P');
        assert_eq!(&buf[6..9], b"p1\0");
    }

    #[test]
    fn sync_and_flush() {
        let mut buf = Vec::new();
        write_sync(&mut buf);
        write_flush(&mut buf);

        assert_eq!(buf.len(), 10);
        assert_eq!(buf[0], b'S');
        assert_eq!(&buf[1..5], &4_i32.to_be_bytes());
        assert_eq!(buf[5], b'H');
        assert_eq!(&buf[6..10], &4_i32.to_be_bytes());
    }
}
