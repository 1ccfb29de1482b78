//! Client-side prepared statement execution for databases speaking an
//! extended query wire protocol (bind/execute/fetch/suspend/close).
//!
//! # Design
//!
//! - **One executor per invocation**: an [`Executor`] binds parameters to a
//!   fresh server-side portal at construction, runs Execute/Sync/Flush fetch
//!   cycles, and releases the portal when closed.
//! - **Serialized wire access**: a [`Connection`] may be shared across
//!   executors; an internal mutex guarantees at most one request/response
//!   exchange is in flight at a time, since the protocol stream carries no
//!   request identifiers.
//! - **Errors as values**: server errors during a fetch cycle land in
//!   [`Executor::error`] for inspection; only transport failures are returned
//!   as `Err`.
//!
//! # Example
//!
//! ```no_run
//! use std::net::TcpStream;
//! use vertiq::{Connection, Executor, Param};
//!
//! fn main() -> vertiq::Result<()> {
//!     // Stream setup and authentication happen elsewhere.
//!     let stream = TcpStream::connect("localhost:5433")?;
//!     let conn = Connection::new(stream);
//!
//!     let stmt = conn.prepare("s1", "SELECT name FROM users WHERE id = $1")?;
//!
//!     let mut exec = Executor::bind(&conn, &stmt, &[Param::new(23, b"42".to_vec())])?;
//!     exec.execute()?;
//!     if let Some(err) = exec.error() {
//!         eprintln!("query failed: {err}");
//!     } else if let Some(result) = exec.take_result() {
//!         for row in result.rows() {
//!             println!("{:?}", row.get_by_name("name"));
//!         }
//!     }
//!     exec.close()?;
//!
//!     conn.close()
//! }
//! ```

pub mod connection;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod row;
pub mod statement;

pub use connection::Connection;
pub use error::{Error, ErrorFields, Result};
pub use executor::{Executor, QueryResult};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use row::{Column, Row};
pub use statement::{Param, PreparedStatement};
