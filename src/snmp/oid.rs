//! Owned object identifiers.
//!
//! The session layer hands out borrowed `snmp2::Oid` values tied to the
//! response buffer; everything above it works on [`ObjectId`], a plain
//! list of arcs that can be stored, compared, and rewritten.

use std::fmt;
use std::str::FromStr;

use crate::snmp::SnmpError;

/// An SNMP object identifier stored as its numeric arcs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId(Vec<u64>);

impl ObjectId {
    /// Build an identifier from raw arcs.
    pub fn from_arcs(arcs: impl Into<Vec<u64>>) -> Self {
        Self(arcs.into())
    }

    /// Numeric arcs of this identifier.
    pub fn arcs(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `prefix` is a proper or improper prefix of `self`.
    pub fn starts_with(&self, prefix: &ObjectId) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Instance suffix below `prefix`, or `None` when `self` is outside
    /// the subtree or equal to the prefix itself.
    pub fn suffix_after(&self, prefix: &ObjectId) -> Option<&[u64]> {
        if self.0.len() > prefix.0.len() && self.starts_with(prefix) {
            Some(&self.0[prefix.0.len()..])
        } else {
            None
        }
    }

    /// Append an instance suffix, producing a new identifier.
    pub fn join(&self, suffix: &[u64]) -> ObjectId {
        let mut arcs = Vec::with_capacity(self.0.len() + suffix.len());
        arcs.extend_from_slice(&self.0);
        arcs.extend_from_slice(suffix);
        ObjectId(arcs)
    }

    /// Identifier with the last arc removed. Used to turn an instance OID
    /// into the column it belongs to before a get-next.
    pub fn parent(&self) -> ObjectId {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => ObjectId(rest.to_vec()),
            _ => self.clone(),
        }
    }

    /// Last arc, if any.
    pub fn last_arc(&self) -> Option<u64> {
        self.0.last().copied()
    }
}

impl FromStr for ObjectId {
    type Err = SnmpError;

    /// Parse dotted notation. A leading dot is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .trim()
            .split('.')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SnmpError::InvalidOid(format!("'{s}': {e}")))?;

        if arcs.len() < 2 {
            return Err(SnmpError::InvalidOid(format!("'{s}': too few arcs")));
        }
        Ok(Self(arcs))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

/// Render an instance suffix the way inventory stores it (`"1.2.3"`).
pub fn format_suffix(suffix: &[u64]) -> String {
    suffix
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
