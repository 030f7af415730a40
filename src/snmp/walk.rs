//! Table walk over get-next.
//!
//! A walk follows one primary column; every other column is read at the
//! instance the primary column just returned. The loop ends as soon as
//! the primary OID leaves its subtree, stops advancing, changes value
//! type, or the agent answers with something unusable, so a misbehaving
//! device cannot keep it spinning.

use std::mem::{Discriminant, discriminant};

use crate::snmp::{ObjectId, SnmpError, SnmpTransport, SnmpValue};

/// Default upper bound on rows returned by one walk.
pub const DEFAULT_MAX_ROWS: usize = 65_536;

/// One table row: the instance suffix and one value per walked column.
///
/// `values[0]` belongs to the primary column, the rest follow the order
/// the columns were given in. A column that has no value at this
/// instance holds [`SnmpValue::NoSuchInstance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRow {
    pub index: Vec<u64>,
    pub values: Vec<SnmpValue>,
}

impl WalkRow {
    /// Value of column `i` (0 is the primary column).
    pub fn value(&self, i: usize) -> &SnmpValue {
        self.values.get(i).unwrap_or(&SnmpValue::NoSuchInstance)
    }
}

/// Why a walk ended.
#[derive(Debug)]
pub enum WalkStop {
    /// Primary OID left the walked subtree. The normal end of a table.
    PrefixLeft,
    /// Agent reported end of MIB view.
    EndOfMib,
    /// Primary OID did not move past the previous one.
    NotAdvancing,
    /// Response had the wrong shape or an exception on the primary column.
    Malformed,
    /// Primary column returned a different value type than its first row.
    TypeMismatch,
    /// Row limit reached.
    RowLimit,
    /// Request failed.
    Error(SnmpError),
}

impl WalkStop {
    /// True for the ways a table walk is expected to end.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::PrefixLeft | Self::EndOfMib)
    }
}

/// Rows collected before the walk stopped, with the reason it stopped.
#[derive(Debug)]
pub struct WalkOutcome {
    pub rows: Vec<WalkRow>,
    pub stop: WalkStop,
}

/// Column walker.
#[derive(Debug, Clone)]
pub struct Walker {
    primary: ObjectId,
    columns: Vec<ObjectId>,
    max_rows: usize,
}

impl Walker {
    pub fn new(primary: ObjectId) -> Self {
        Self {
            primary,
            columns: Vec::new(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    /// Add a column read alongside the primary one.
    pub fn column(mut self, column: ObjectId) -> Self {
        self.columns.push(column);
        self
    }

    pub fn max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Run the walk to completion.
    pub async fn run<T>(&self, transport: &mut T) -> WalkOutcome
    where
        T: SnmpTransport + ?Sized,
    {
        let mut query = Vec::with_capacity(self.columns.len() + 1);
        query.push(self.primary.clone());
        query.extend(self.columns.iter().cloned());

        let mut rows = Vec::new();
        let mut last: Option<ObjectId> = None;
        let mut kind: Option<Discriminant<SnmpValue>> = None;

        let stop = loop {
            if rows.len() >= self.max_rows {
                break WalkStop::RowLimit;
            }

            let response = match transport.get_next(&query).await {
                Ok(response) => response,
                Err(e) => break WalkStop::Error(e),
            };
            if response.len() != query.len() {
                tracing::debug!(
                    expected = query.len(),
                    got = response.len(),
                    "walk response has wrong binding count"
                );
                break WalkStop::Malformed;
            }

            let first = &response[0];
            if first.value == SnmpValue::EndOfMibView {
                break WalkStop::EndOfMib;
            }
            let Some(index) = first.oid.suffix_after(&self.primary) else {
                break WalkStop::PrefixLeft;
            };
            if last.as_ref().is_some_and(|prev| first.oid <= *prev) {
                break WalkStop::NotAdvancing;
            }
            if first.value.is_exception() {
                break WalkStop::Malformed;
            }
            let this_kind = discriminant(&first.value);
            if kind.is_some_and(|k| k != this_kind) {
                break WalkStop::TypeMismatch;
            }
            kind = Some(this_kind);
            let index = index.to_vec();

            let mut values = Vec::with_capacity(response.len());
            values.push(first.value.clone());
            for (column, bind) in self.columns.iter().zip(&response[1..]) {
                // sparse column: the successor belongs to another instance
                if bind.oid.suffix_after(column) == Some(index.as_slice()) {
                    values.push(bind.value.clone());
                } else {
                    values.push(SnmpValue::NoSuchInstance);
                }
            }

            query[0] = first.oid.clone();
            for (slot, column) in query[1..].iter_mut().zip(&self.columns) {
                *slot = column.join(&index);
            }
            last = Some(first.oid.clone());
            rows.push(WalkRow { index, values });
        };

        if !stop.is_clean() {
            tracing::debug!(
                primary = %self.primary,
                rows = rows.len(),
                stop = ?stop,
                "walk stopped early"
            );
        }

        WalkOutcome { rows, stop }
    }
}
