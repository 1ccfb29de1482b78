//! Prepared statement execution: bind, fetch cycle, portal teardown.

use std::io::{Read, Write};
use std::mem;
use std::sync::Arc;

use crate::connection::{Connection, Wire};
use crate::error::{ErrorFields, Result};
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::{write_bind, write_close_portal, write_execute, write_flush, write_sync};
use crate::row::{Column, Row};
use crate::statement::{Param, PreparedStatement};

/// Result of one buffered execution: the rows in server-emitted order plus
/// the command tag (empty when the cycle ended in suspension).
#[derive(Debug)]
pub struct QueryResult {
    columns: Arc<[Column]>,
    rows: Vec<Row>,
    command_tag: String,
}

impl QueryResult {
    /// Column metadata of the result set.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Buffered rows in arrival order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were buffered.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Command tag reported by the server (e.g. "SELECT 3"); empty if the
    /// cycle ended in portal suspension.
    pub fn command_tag(&self) -> &str {
        &self.command_tag
    }

    /// Parse the affected-row count from the command tag, if present.
    pub fn rows_affected(&self) -> Option<u64> {
        let mut parts = self.command_tag.split_whitespace();
        match (parts.next()?, parts.next(), parts.next()) {
            ("INSERT", Some(_oid), Some(count)) => count.parse().ok(),
            ("SELECT" | "UPDATE" | "DELETE" | "COPY" | "MOVE" | "FETCH", Some(count), None) => {
                count.parse().ok()
            }
            _ => None,
        }
    }

    /// Take ownership of the rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Where decoded rows go during one fetch cycle. Decided once at `execute`
/// entry and held for the cycle's lifetime.
enum RowSink<'f> {
    Buffered(Vec<Row>),
    Streamed(&'f mut dyn FnMut(Row) -> Result<()>),
}

impl RowSink<'_> {
    fn push(&mut self, row: Row) -> Result<()> {
        match self {
            RowSink::Buffered(rows) => {
                rows.push(row);
                Ok(())
            }
            RowSink::Streamed(f) => f(row),
        }
    }
}

enum Flow {
    Continue,
    Finished,
}

/// Executes one prepared statement invocation: binds parameters to a fresh
/// portal at construction, drives the Execute/Sync/Flush fetch cycle, and
/// releases the portal on [`close`](Self::close).
///
/// Server errors during a fetch cycle are recovered into [`error`](Self::error)
/// rather than returned as `Err`; only transport failures propagate. Callers
/// must check `error()` before trusting the result.
///
/// # Example
///
/// ```ignore
/// let stmt = conn.prepare("s1", "SELECT id FROM t WHERE org = $1")?;
/// let mut exec = Executor::bind(&conn, &stmt, &[Param::new(23, b"7".to_vec())])?;
/// exec.execute()?;
/// if let Some(err) = exec.error() {
///     eprintln!("server rejected query: {err}");
/// } else if let Some(result) = exec.result() {
///     for row in result.rows() {
///         println!("{:?}", row.get(0));
///     }
/// }
/// exec.close()?;
/// ```
pub struct Executor<'a, S> {
    conn: &'a Connection<S>,
    statement: &'a PreparedStatement,
    portal_name: String,
    columns: Arc<[Column]>,
    max_rows: u32,
    error: Option<ErrorFields>,
    result: Option<QueryResult>,
    suspended: bool,
}

impl<'a, S: Read + Write> Executor<'a, S> {
    /// Bind `params` to a fresh portal over `statement`.
    ///
    /// Sends Bind + Flush immediately without awaiting a response; the
    /// acknowledgement (or a bind error) is consumed during the next
    /// [`execute`](Self::execute) call's message loop. Parameter arity and
    /// types are the prepare step's contract, not validated here.
    pub fn bind(
        conn: &'a Connection<S>,
        statement: &'a PreparedStatement,
        params: &[Param],
    ) -> Result<Self> {
        let portal_name = conn.generate_portal_name();

        conn.exclusive(|wire| {
            wire.send(|buf| {
                write_bind(buf, &portal_name, &statement.name, params);
                write_flush(buf);
            })
        })?;

        Ok(Self {
            conn,
            statement,
            portal_name,
            columns: Arc::clone(&statement.columns),
            max_rows: 0,
            error: None,
            result: None,
            suspended: false,
        })
    }

    /// Set the per-cycle row limit (0 = no limit, the default).
    ///
    /// With a nonzero limit the server may answer a cycle with
    /// PortalSuspended instead of CommandComplete; see
    /// [`is_suspended`](Self::is_suspended).
    pub fn max_rows(&mut self, max_rows: u32) -> &mut Self {
        self.max_rows = max_rows;
        self
    }

    /// Run one fetch cycle, buffering all rows.
    ///
    /// On return, [`result`](Self::result) holds the buffered rows unless the
    /// server reported an error, in which case [`error`](Self::error) is set
    /// and the result is absent. Re-invocation runs another Execute cycle on
    /// the same portal (continuing after a suspension).
    pub fn execute(&mut self) -> Result<()> {
        let mut sink = RowSink::Buffered(Vec::new());
        self.execute_inner(&mut sink)
    }

    /// Run one fetch cycle, delivering each row to `row_handler` as it is
    /// decoded. Nothing is retained; [`result`](Self::result) stays absent.
    ///
    /// After a suspension (nonzero [`max_rows`](Self::max_rows)), call this
    /// again to fetch the next batch; the core never auto-continues.
    pub fn execute_with(&mut self, mut row_handler: impl FnMut(Row) -> Result<()>) -> Result<()> {
        let mut sink = RowSink::Streamed(&mut row_handler);
        self.execute_inner(&mut sink)
    }

    fn execute_inner(&mut self, sink: &mut RowSink<'_>) -> Result<()> {
        self.error = None;
        self.result = None;
        self.suspended = false;

        tracing::debug!(
            sql = %self.statement.sql,
            portal = %self.portal_name,
            max_rows = self.max_rows,
            "executing prepared statement"
        );

        let conn = self.conn;
        conn.exclusive(|wire| self.run(wire, sink))
    }

    /// The fetch cycle: Execute + Sync + Flush, then drain the response
    /// stream until ReadyForQuery. Caller holds the connection lock.
    fn run(&mut self, wire: &mut Wire<S>, sink: &mut RowSink<'_>) -> Result<()> {
        let portal_name = self.portal_name.as_str();
        let max_rows = self.max_rows;
        wire.send(|buf| {
            write_execute(buf, portal_name, max_rows);
            write_sync(buf);
            write_flush(buf);
        })?;

        loop {
            let message = wire.read_message()?;
            match self.process_message(message, sink)? {
                Flow::Continue => {}
                Flow::Finished => return Ok(()),
            }
        }
    }

    /// Portal-specific dispatch; everything not intercepted here falls
    /// through to the generic per-statement processor.
    fn process_message(&mut self, message: BackendMessage, sink: &mut RowSink<'_>) -> Result<Flow> {
        match message {
            // Synchronization point: the portal is ready, nothing to record.
            BackendMessage::BindComplete => Ok(Flow::Continue),
            BackendMessage::PortalSuspended => {
                self.handle_portal_suspended(sink);
                Ok(Flow::Continue)
            }
            other => self.process_common(other, sink),
        }
    }

    /// The row limit was reached with rows remaining. Buffered callers get
    /// whatever was buffered so far as a finished result; streamed callers
    /// decide themselves whether to run another cycle.
    fn handle_portal_suspended(&mut self, sink: &mut RowSink<'_>) {
        self.suspended = true;
        match sink {
            RowSink::Buffered(_) => self.complete_operation(sink, String::new()),
            RowSink::Streamed(_) => self.result = None,
        }
    }

    /// Generic message processing shared by all statement kinds: row decode
    /// and dispatch, completion detection, error capture.
    fn process_common(&mut self, message: BackendMessage, sink: &mut RowSink<'_>) -> Result<Flow> {
        match message {
            BackendMessage::RowDescription(columns) => {
                self.columns = columns.into();
                Ok(Flow::Continue)
            }
            BackendMessage::DataRow(values) => {
                let row = Row::new(Arc::clone(&self.columns), values)?;
                sink.push(row)?;
                Ok(Flow::Continue)
            }
            BackendMessage::CommandComplete(tag) => {
                self.complete_operation(sink, tag);
                Ok(Flow::Continue)
            }
            BackendMessage::EmptyQueryResponse => {
                self.complete_operation(sink, String::new());
                Ok(Flow::Continue)
            }
            BackendMessage::ErrorResponse(fields) => {
                self.error = Some(fields);
                Ok(Flow::Continue)
            }
            BackendMessage::NoticeResponse(fields) => {
                tracing::debug!(notice = %fields, "notice during execution");
                Ok(Flow::Continue)
            }
            BackendMessage::ParameterStatus { name, value } => {
                tracing::debug!(%name, %value, "parameter changed during execution");
                Ok(Flow::Continue)
            }
            BackendMessage::ReadyForQuery(_) => Ok(Flow::Finished),
            unexpected @ (BackendMessage::ParseComplete
            | BackendMessage::CloseComplete
            | BackendMessage::NoData
            | BackendMessage::ParameterDescription(_)
            | BackendMessage::BindComplete
            | BackendMessage::PortalSuspended) => Err(crate::error::Error::Protocol(format!(
                "unexpected message during fetch cycle: {}",
                MessageKind(&unexpected)
            ))),
        }
    }

    fn complete_operation(&mut self, sink: &mut RowSink<'_>, command_tag: String) {
        match sink {
            RowSink::Buffered(rows) => {
                self.result = Some(QueryResult {
                    columns: Arc::clone(&self.columns),
                    rows: mem::take(rows),
                    command_tag,
                });
            }
            RowSink::Streamed(_) => self.result = None,
        }
    }

    /// Release the server-side portal: Close + Flush, then drain responses
    /// until CloseComplete. Every other message in between is discarded.
    ///
    /// Consumes the executor, so teardown happens exactly once. A transport
    /// error here means the portal's state is unknown and the connection
    /// should be discarded.
    pub fn close(self) -> Result<()> {
        let portal_name = self.portal_name;
        self.conn.exclusive(|wire| {
            wire.send(|buf| {
                write_close_portal(buf, &portal_name);
                write_flush(buf);
            })?;

            loop {
                match wire.read_message()? {
                    BackendMessage::CloseComplete => return Ok(()),
                    other => {
                        tracing::debug!(
                            kind = %MessageKind(&other),
                            portal = %portal_name,
                            "discarding message while draining portal close"
                        );
                    }
                }
            }
        })
    }

    /// Name of the portal this executor owns.
    pub fn portal_name(&self) -> &str {
        &self.portal_name
    }

    /// Server error captured during the last cycle, if any.
    pub fn error(&self) -> Option<&ErrorFields> {
        self.error.as_ref()
    }

    /// Buffered result of the last cycle. Absent in streamed mode, after a
    /// server error, or before the first `execute`.
    pub fn result(&self) -> Option<&QueryResult> {
        self.result.as_ref()
    }

    /// Take ownership of the buffered result.
    pub fn take_result(&mut self) -> Option<QueryResult> {
        self.result.take()
    }

    /// True if the last cycle ended in portal suspension (more rows remain
    /// on the server than the row limit allowed).
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

/// Compact display of a message's kind for diagnostics, without dumping
/// row payloads into logs.
struct MessageKind<'m>(&'m BackendMessage);

impl std::fmt::Display for MessageKind<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            BackendMessage::BindComplete => "BindComplete",
            BackendMessage::CloseComplete => "CloseComplete",
            BackendMessage::ParseComplete => "ParseComplete",
            BackendMessage::NoData => "NoData",
            BackendMessage::PortalSuspended => "PortalSuspended",
            BackendMessage::ParameterDescription(_) => "ParameterDescription",
            BackendMessage::RowDescription(_) => "RowDescription",
            BackendMessage::DataRow(_) => "DataRow",
            BackendMessage::CommandComplete(_) => "CommandComplete",
            BackendMessage::EmptyQueryResponse => "EmptyQueryResponse",
            BackendMessage::ErrorResponse(_) => "ErrorResponse",
            BackendMessage::NoticeResponse(_) => "NoticeResponse",
            BackendMessage::ParameterStatus { .. } => "ParameterStatus",
            BackendMessage::ReadyForQuery(_) => "ReadyForQuery",
        };
        f.write_str(name)
    }
}
