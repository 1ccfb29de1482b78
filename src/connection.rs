//! Shared connection: message framing, exclusive access, statement preparation.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::{
    write_describe_statement, write_flush, write_parse, write_sync, write_terminate,
};
use crate::row::Column;
use crate::statement::PreparedStatement;

const SECS_PER_DAY: u64 = 86_400;

/// Read a single framed message from the stream and decode it.
fn read_message_from<S: Read>(stream: &mut S, read_buffer: &mut Vec<u8>) -> Result<BackendMessage> {
    let mut type_byte = [0u8; 1];
    stream.read_exact(&mut type_byte)?;

    let mut length_bytes = [0u8; 4];
    stream.read_exact(&mut length_bytes)?;
    let length = u32::from_be_bytes(length_bytes);

    if length < 4 {
        return Err(Error::Protocol(format!("invalid message length: {length}")));
    }

    let payload_len = (length - 4) as usize;
    read_buffer.clear();
    read_buffer.resize(payload_len, 0);
    stream.read_exact(read_buffer)?;

    BackendMessage::decode(type_byte[0], read_buffer)
}

/// Wire-level state of one connection. Lives behind the connection mutex so
/// that exactly one statement execution is in flight at a time.
pub(crate) struct Wire<S> {
    stream: S,
    write_buffer: Vec<u8>,
    read_buffer: Vec<u8>,
}

impl<S: Read + Write> Wire<S> {
    /// Encode one or more frontend messages into the write buffer and send them.
    pub(crate) fn send(&mut self, encode: impl FnOnce(&mut Vec<u8>)) -> Result<()> {
        self.write_buffer.clear();
        encode(&mut self.write_buffer);
        self.stream.write_all(&self.write_buffer)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Block until the next backend message arrives.
    pub(crate) fn read_message(&mut self) -> Result<BackendMessage> {
        read_message_from(&mut self.stream, &mut self.read_buffer)
    }
}

/// A connection to the server, shareable across statement executions.
///
/// The wire protocol is a single ordered byte stream with no request
/// identifiers, so all protocol traffic is serialized through an internal
/// mutex: whichever executor holds it owns the connection's full
/// request/response exchange until it releases it.
///
/// Connection establishment and authentication happen elsewhere; this type is
/// built from an already-negotiated duplex stream.
pub struct Connection<S> {
    wire: Mutex<Wire<S>>,
    portal_seq: AtomicU64,
}

impl<S: Read + Write> Connection<S> {
    /// Wrap an established duplex stream.
    pub fn new(stream: S) -> Self {
        Self {
            wire: Mutex::new(Wire {
                stream,
                write_buffer: Vec::with_capacity(8192),
                read_buffer: Vec::with_capacity(8192),
            }),
            portal_seq: AtomicU64::new(0),
        }
    }

    /// Run `f` with exclusive use of the wire.
    ///
    /// The lock is released on every exit path, including errors raised inside
    /// `f`, via guard drop. A poisoned lock is recovered: the wire state is a
    /// pair of scratch buffers plus the stream, all valid after a panic.
    pub(crate) fn exclusive<R>(&self, f: impl FnOnce(&mut Wire<S>) -> Result<R>) -> Result<R> {
        let mut wire = self.wire.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut wire)
    }

    /// Generate a portal name unique within this connection's lifetime.
    ///
    /// The wall-clock `HHMMSSNNNNNNNNN` prefix keeps names recognizable in
    /// server logs; the monotonic suffix is what actually guarantees two
    /// portals bound within one clock tick cannot collide.
    pub(crate) fn generate_portal_name(&self) -> String {
        let seq = self.portal_seq.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs() % SECS_PER_DAY;
        format!(
            "{:02}{:02}{:02}{:09}_{}",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60,
            now.subsec_nanos(),
            seq
        )
    }

    /// Prepare a statement: Parse + Describe + Flush, then collect the
    /// statement's parameter and column metadata.
    ///
    /// On a server error the connection is resynchronized with Sync before the
    /// error is returned, so the next operation starts from a clean cycle.
    pub fn prepare(&self, name: &str, sql: &str) -> Result<PreparedStatement> {
        self.exclusive(|wire| {
            wire.send(|buf| {
                write_parse(buf, name, sql, &[]);
                write_describe_statement(buf, name);
                write_flush(buf);
            })?;

            let mut param_oids = Vec::new();
            let columns: Vec<Column> = loop {
                match wire.read_message()? {
                    BackendMessage::ParseComplete => {}
                    BackendMessage::ParameterDescription(oids) => param_oids = oids,
                    BackendMessage::RowDescription(columns) => break columns,
                    BackendMessage::NoData => break Vec::new(),
                    BackendMessage::NoticeResponse(fields) => {
                        tracing::debug!(notice = %fields, "notice during prepare");
                    }
                    BackendMessage::ParameterStatus { name, value } => {
                        tracing::debug!(%name, %value, "parameter changed during prepare");
                    }
                    BackendMessage::ErrorResponse(fields) => {
                        resync(wire)?;
                        return Err(Error::Server(fields));
                    }
                    other => {
                        return Err(Error::Protocol(format!(
                            "unexpected message during prepare: {other:?}"
                        )));
                    }
                }
            };

            Ok(PreparedStatement {
                name: name.to_string(),
                sql: sql.to_string(),
                param_oids,
                columns: columns.into(),
            })
        })
    }

    /// Close the connection gracefully by sending Terminate.
    pub fn close(self) -> Result<()> {
        let mut wire = self
            .wire
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        wire.send(write_terminate)
    }
}

/// Send Sync and drain to ReadyForQuery after a mid-cycle server error.
fn resync<S: Read + Write>(wire: &mut Wire<S>) -> Result<()> {
    wire.send(write_sync)?;
    loop {
        if let BackendMessage::ReadyForQuery(_) = wire.read_message()? {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    struct NoopStream;

    impl Read for NoopStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for NoopStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn portal_names_unique_within_one_tick() {
        let conn = Connection::new(NoopStream);
        let names: HashSet<String> = (0..1000).map(|_| conn.generate_portal_name()).collect();
        assert_eq!(names.len(), 1000);
    }

    #[test]
    fn portal_name_has_timestamp_prefix() {
        let conn = Connection::new(NoopStream);
        let name = conn.generate_portal_name();
        let (prefix, seq) = name.split_once('_').unwrap();
        assert_eq!(prefix.len(), 15);
        assert!(prefix.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(seq, "0");
    }
}
