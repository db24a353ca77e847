//! Query results
//!
//! Text-protocol results: every non-NULL cell arrives as the server's string
//! rendering of the value, kept here as raw bytes.

use crate::protocol::{ColumnDefinition, EofPacket, OkPacket};
use bytes::Bytes;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Column metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    /// Column name or alias
    pub name: String,
    /// Table name or alias (empty for expressions)
    pub table: String,
    /// Schema name
    pub schema: String,
    /// Column type (MYSQL_TYPE_*)
    pub column_type: u8,
    /// Column flags
    pub flags: u16,
    /// Character set id
    pub charset: u16,
}

impl From<ColumnDefinition> for Column {
    fn from(def: ColumnDefinition) -> Self {
        Self {
            name: def.name,
            table: def.table,
            schema: def.schema,
            column_type: def.column_type,
            flags: def.flags,
            charset: def.charset,
        }
    }
}

/// A result row
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Option<Bytes>>,
}

impl Row {
    /// Number of cells
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no cells
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw cell value; `None` for SQL NULL or an out-of-range index
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.values.get(idx)?.as_deref()
    }

    /// Cell value as UTF-8; `None` for SQL NULL, invalid UTF-8 or an out-of-range index
    pub fn get_str(&self, idx: usize) -> Option<&str> {
        std::str::from_utf8(self.get(idx)?).ok()
    }

    /// Whether the cell is SQL NULL
    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(None))
    }

    /// Cell value by column name
    pub fn get_by_name(&self, name: &str) -> Option<&[u8]> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        self.get(idx)
    }

    /// Column metadata for this row
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            let value = value.as_ref().map(|v| String::from_utf8_lossy(v));
            map.serialize_entry(&column.name, &value)?;
        }
        map.end()
    }
}

/// Result of one COM_QUERY
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: Vec<Row>,
    /// Rows changed by a DML statement
    pub affected_rows: u64,
    /// AUTO_INCREMENT value generated by the statement
    pub last_insert_id: u64,
    /// Warning count
    pub warnings: u16,
    /// Server status flags after the statement
    pub status_flags: u16,
    /// Server info string (e.g. "Rows matched: 1  Changed: 1  Warnings: 0")
    pub info: String,
}

impl ResultSet {
    /// Result of a statement that returned no rows
    pub(crate) fn from_ok(ok: OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status_flags: ok.status_flags,
            info: ok.info,
            ..Self::with_columns(Vec::new())
        }
    }

    /// Empty result with the given columns
    pub(crate) fn with_columns(columns: Vec<Column>) -> Self {
        Self {
            columns: Arc::from(columns),
            rows: Vec::new(),
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            status_flags: 0,
            info: String::new(),
        }
    }

    pub(crate) fn push_row(&mut self, values: Vec<Option<Bytes>>) {
        self.rows.push(Row {
            columns: self.columns.clone(),
            values,
        });
    }

    pub(crate) fn finish(&mut self, eof: EofPacket) {
        self.warnings = eof.warnings;
        self.status_flags = eof.status_flags;
    }

    /// Column metadata
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows, in server order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take ownership of the rows
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, as UTF-8
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.get_str(0)
    }
}
