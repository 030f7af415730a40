//! OID templates and the per-run template cache.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::inventory::device::{int_field, text_field};
use crate::snmp::{ObjectId, SnmpError};
use crate::storage::{DataSourceKind, Row, StorageError, TsConfig};

/// Name of the single data source in template-driven files.
pub const VALUE_SOURCE: &str = "val";

/// Interface type id. Device-level templates live under [`IfaceType::DEVICE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IfaceType(pub i64);

impl IfaceType {
    pub const DEVICE: IfaceType = IfaceType(0);
}

/// One template row.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Storage path below the time-series base directory.
    pub path: String,
    /// OID for SNMP templates, SQL for relational ones.
    pub query: String,
    pub rate: Decimal,
    pub counter: DataSourceKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Step in seconds.
    pub step: u64,
    pub threshold: Option<f64>,
}

impl Template {
    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        let counter_raw = row.get("counter_type").map_or("GAUGE", String::as_str);
        Ok(Self {
            path: text_field(row, "path")?,
            query: text_field(row, "query")?,
            rate: decimal_field(row, "rate")?.unwrap_or(Decimal::ONE),
            counter: DataSourceKind::from_str(counter_raw).map_err(|_| {
                StorageError::InvalidData(format!("unknown counter type: {counter_raw}"))
            })?,
            min: float_field(row, "min")?,
            max: float_field(row, "max")?,
            step: u64::try_from(int_field(row, "step")?)
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| StorageError::InvalidData("step must be positive".to_string()))?,
            threshold: float_field(row, "threshold")?,
        })
    }

    /// The template query as an OID.
    pub fn oid(&self) -> Result<ObjectId, SnmpError> {
        self.query.parse()
    }

    /// Layout for a new file of this template.
    pub fn ts_config(&self) -> TsConfig {
        TsConfig::new(self.step).data_source(VALUE_SOURCE, self.counter, self.min, self.max)
    }
}

fn decimal_field(row: &Row, name: &str) -> Result<Option<Decimal>, StorageError> {
    row.get(name)
        .map(|raw| {
            Decimal::from_str(raw.trim())
                .or_else(|_| Decimal::from_scientific(raw.trim()))
                .map_err(|_| {
                    StorageError::InvalidData(format!("column {name}: not a number: {raw}"))
                })
        })
        .transpose()
}

fn float_field(row: &Row, name: &str) -> Result<Option<f64>, StorageError> {
    row.get(name)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| {
                    StorageError::InvalidData(format!("column {name}: not a number: {raw}"))
                })
        })
        .transpose()
}

// =============================================================================
// Cache
// =============================================================================

/// Read-only lookup from (device type, interface type) to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    by_type: HashMap<i64, HashMap<IfaceType, Vec<Template>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device_type: i64, iface_type: IfaceType, template: Template) {
        self.by_type
            .entry(device_type)
            .or_default()
            .entry(iface_type)
            .or_default()
            .push(template);
    }

    /// Templates for one pair; empty when none are configured.
    pub fn get(&self, device_type: i64, iface_type: IfaceType) -> &[Template] {
        self.by_type
            .get(&device_type)
            .and_then(|m| m.get(&iface_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Interface types (excluding device level) with templates for `device_type`.
    pub fn iface_types(&self, device_type: i64) -> Vec<IfaceType> {
        let mut types: Vec<IfaceType> = self
            .by_type
            .get(&device_type)
            .map(|m| m.keys().copied().filter(|t| *t != IfaceType::DEVICE).collect())
            .unwrap_or_default();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.by_type
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every distinct template path.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self
            .by_type
            .values()
            .flat_map(HashMap::values)
            .flatten()
            .map(|t| t.path.as_str())
            .collect();
        paths.sort_unstable();
        paths.dedup();
        paths
    }
}
