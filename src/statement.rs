//! Prepared statement handles and bind-time parameters.

use std::sync::Arc;

use crate::protocol::types::Oid;
use crate::row::Column;

/// Handle to a server-side prepared statement.
///
/// Produced by [`Connection::prepare`](crate::Connection::prepare); referenced
/// (not owned) by each [`Executor`](crate::Executor) that binds a portal to it.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub(crate) name: String,
    pub(crate) sql: String,
    pub(crate) param_oids: Vec<Oid>,
    pub(crate) columns: Arc<[Column]>,
}

impl PreparedStatement {
    /// Server-side statement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL text, kept for diagnostics.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Declared parameter type OIDs.
    pub fn param_oids(&self) -> &[Oid] {
        &self.param_oids
    }

    /// Column metadata, empty if the statement returns no rows.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

/// One bind-time parameter: a declared type and an encoded value.
///
/// Encoding values for the wire is the caller's concern; `None` is SQL NULL.
#[derive(Debug, Clone)]
pub struct Param {
    /// Declared type OID
    pub type_oid: Oid,
    /// Encoded value bytes, `None` for NULL
    pub value: Option<Vec<u8>>,
}

impl Param {
    /// A non-NULL parameter.
    pub fn new(type_oid: Oid, value: Vec<u8>) -> Self {
        Self {
            type_oid,
            value: Some(value),
        }
    }

    /// A NULL parameter of the given declared type.
    pub fn null(type_oid: Oid) -> Self {
        Self {
            type_oid,
            value: None,
        }
    }
}
