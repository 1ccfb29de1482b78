//! Column metadata and decoded rows.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};

/// Column metadata from a RowDescription message.
///
/// Established when the statement is described and passed through unchanged;
/// value decoding beyond raw bytes is the caller's concern.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier (type-specific)
    pub type_modifier: i32,
    /// Format code (0=text, 1=binary)
    pub format: FormatCode,
}

/// One decoded row.
///
/// Cells are raw wire bytes in server order; `None` is SQL NULL. Column
/// metadata is shared across all rows of one result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Option<Vec<u8>>>,
}

impl Row {
    /// Assemble a row from shared column metadata and a decoded DataRow.
    pub(crate) fn new(columns: Arc<[Column]>, values: Vec<Option<Vec<u8>>>) -> Result<Self> {
        if values.len() != columns.len() {
            return Err(Error::Protocol(format!(
                "DataRow has {} cells but RowDescription declared {} columns",
                values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Column metadata for this row.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a cell by index. Returns `None` for out-of-range indexes,
    /// `Some(None)` for SQL NULL.
    pub fn get(&self, index: usize) -> Option<Option<&[u8]>> {
        self.values.get(index).map(|v| v.as_deref())
    }

    /// Get a cell by column name.
    pub fn get_by_name(&self, name: &str) -> Option<Option<&[u8]>> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        self.get(index)
    }

    /// Iterate over cells in column order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.values.iter().map(|v| v.as_deref())
    }

    /// Take ownership of the raw cells.
    pub fn into_values(self) -> Vec<Option<Vec<u8>>> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> Column {
        Column {
            name: name.to_string(),
            table_oid: 0,
            column_id: 0,
            type_oid: 25,
            type_size: -1,
            type_modifier: -1,
            format: FormatCode::Text,
        }
    }

    #[test]
    fn access_by_index_and_name() {
        let columns: Arc<[Column]> = vec![column("x"), column("y")].into();
        let row = Row::new(columns, vec![Some(b"1".to_vec()), None]).unwrap();

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(Some(&b"1"[..])));
        assert_eq!(row.get(1), Some(None));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get_by_name("y"), Some(None));
        assert_eq!(row.get_by_name("z"), None);
    }

    #[test]
    fn arity_mismatch_rejected() {
        let columns: Arc<[Column]> = vec![column("x")].into();
        assert!(Row::new(columns, vec![None, None]).is_err());
    }
}
