//! DuckDB-backed relational store.
//!
//! [`DuckStore`] owns the write connection and is moved into the mutation
//! drain thread. [`RowReader`] wraps a cloned connection of the same
//! database instance, so reads see every applied mutation without a
//! checkpoint.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use duckdb::types::Value;
use duckdb::{Connection, params_from_iter};

use crate::storage::StorageError;
use crate::storage::actor::RelationalStore;
use crate::storage::queue::SqlArg;
use crate::storage::schema::init_schema;

/// One selected row: column name to textual value. SQL NULLs are absent.
pub type Row = HashMap<String, String>;

/// Read side of the relational store.
pub trait RowSource: Send + Sync {
    fn select_rows(&self, query: &str, args: &[SqlArg]) -> Result<Vec<Row>, StorageError>;
}

/// Write connection, owned by the drain thread.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open (or create) the database file and initialize the schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// A reader sharing this store's database instance.
    pub fn reader(&self) -> Result<RowReader, StorageError> {
        Ok(RowReader {
            conn: Arc::new(Mutex::new(self.conn.try_clone()?)),
        })
    }
}

impl RelationalStore for DuckStore {
    fn execute(&mut self, statement: &str, args: &[SqlArg]) -> Result<usize, StorageError> {
        let mut stmt = self.conn.prepare_cached(statement)?;
        let affected = stmt.execute(params_from_iter(args.iter().map(to_value)))?;
        Ok(affected)
    }

    fn finish(&mut self) -> Result<(), StorageError> {
        self.conn.execute_batch("CHECKPOINT;")?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }
}

/// Cloneable read handle.
#[derive(Clone)]
pub struct RowReader {
    conn: Arc<Mutex<Connection>>,
}

impl RowSource for RowReader {
    fn select_rows(&self, query: &str, args: &[SqlArg]) -> Result<Vec<Row>, StorageError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StorageError::Internal("reader connection poisoned".to_string()))?;

        let mut stmt = conn.prepare(query)?;
        let mut rows = stmt.query(params_from_iter(args.iter().map(to_value)))?;
        let columns = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                let value: Value = row.get(i)?;
                if let Some(text) = value_text(value) {
                    record.insert(name.clone(), text);
                }
            }
            out.push(record);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader").finish_non_exhaustive()
    }
}

fn to_value(arg: &SqlArg) -> Value {
    match arg {
        SqlArg::Null => Value::Null,
        SqlArg::Int(v) => Value::BigInt(*v),
        SqlArg::Float(v) => Value::Double(*v),
        SqlArg::Text(v) => Value::Text(v.clone()),
    }
}

/// Textual form of a scalar column; NULL and nested types yield `None`.
fn value_text(value: Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::Boolean(b) => if b { "1" } else { "0" }.to_string(),
        Value::TinyInt(v) => v.to_string(),
        Value::SmallInt(v) => v.to_string(),
        Value::Int(v) => v.to_string(),
        Value::BigInt(v) => v.to_string(),
        Value::HugeInt(v) => v.to_string(),
        Value::UTinyInt(v) => v.to_string(),
        Value::USmallInt(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::UBigInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Text(v) | Value::Enum(v) => v,
        _ => return None,
    };
    Some(text)
}
