//! Inventory: devices, interfaces and templates read from the relational
//! store once per run.

mod device;
mod template;

use std::path::Path;

pub use device::{Credentials, Device, DeviceScope, TemplateLevel, device_query, parse_snmp_version};
pub use template::{IfaceType, Template, TemplateCache, VALUE_SOURCE};

pub(crate) use device::{int_field, text_field};

use crate::storage::{Row, RowSource, SqlArg, StorageError};

const SNMP_TEMPLATES_SQL: &str = "SELECT device_type_id, iface_type_id, \
     shared || '/' || name AS path, query, rate, counter_type, min, max, step, threshold \
     FROM snmp_templates WHERE source = 'snmp' ORDER BY id";

const SQL_TEMPLATES_SQL: &str = "SELECT shared || '/' || name AS path, query, rate, \
     counter_type, min, max, step, threshold \
     FROM snmp_templates WHERE source = 'sql' ORDER BY id";

const IFACES_SQL: &str =
    "SELECT id, oid FROM device_ifaces WHERE device_id = ? AND iface_type_id = ? ORDER BY id";

/// A known interface instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iface {
    pub id: i64,
    /// Instance suffix appended to template OIDs (the ifIndex).
    pub index: String,
}

/// Load devices in `scope`; rows that fail to parse are skipped.
pub fn load_devices(
    source: &dyn RowSource,
    scope: &DeviceScope,
    level: Option<TemplateLevel>,
) -> Result<Vec<Device>, StorageError> {
    let (sql, args) = device_query(scope, level);
    let devices = parse_rows(source.select_rows(&sql, &args)?, "device", Device::from_row);
    tracing::info!(count = devices.len(), ?scope, "Devices loaded");
    Ok(devices)
}

/// Build the template cache for SNMP jobs.
///
/// When `ts_dir` is given, each template's storage directory is created.
pub fn load_templates(
    source: &dyn RowSource,
    ts_dir: Option<&Path>,
) -> Result<TemplateCache, StorageError> {
    let mut cache = TemplateCache::new();

    for row in source.select_rows(SNMP_TEMPLATES_SQL, &[])? {
        let keyed = device::int_field(&row, "device_type_id").and_then(|device_type| {
            let iface_type = match row.get("iface_type_id") {
                Some(_) => IfaceType(device::int_field(&row, "iface_type_id")?),
                None => IfaceType::DEVICE,
            };
            Ok((device_type, iface_type, Template::from_row(&row)?))
        });
        match keyed {
            Ok((device_type, iface_type, template)) => {
                cache.insert(device_type, iface_type, template)
            }
            Err(e) => tracing::warn!(error = %e, "Skipping template row"),
        }
    }

    if let Some(dir) = ts_dir {
        create_template_dirs(dir, cache.paths().into_iter())?;
    }

    tracing::info!(count = cache.len(), "Templates loaded");
    Ok(cache)
}

/// Templates whose query is a relational value query.
pub fn load_sql_templates(source: &dyn RowSource) -> Result<Vec<Template>, StorageError> {
    Ok(parse_rows(
        source.select_rows(SQL_TEMPLATES_SQL, &[])?,
        "template",
        Template::from_row,
    ))
}

/// Known interfaces of one type on one device.
pub fn load_ifaces(
    source: &dyn RowSource,
    device_id: i64,
    iface_type: IfaceType,
) -> Result<Vec<Iface>, StorageError> {
    let rows = source.select_rows(
        IFACES_SQL,
        &[SqlArg::Int(device_id), SqlArg::Int(iface_type.0)],
    )?;
    Ok(parse_rows(rows, "interface", |row| {
        Ok(Iface {
            id: device::int_field(row, "id")?,
            index: device::text_field(row, "oid")?,
        })
    }))
}

pub fn create_template_dirs<'a>(
    base: &Path,
    paths: impl Iterator<Item = &'a str>,
) -> Result<(), StorageError> {
    for path in paths {
        let dir = base.join(path);
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                StorageError::Internal(format!("Failed to create '{}': {e}", dir.display()))
            })?;
            tracing::info!(dir = %dir.display(), "Created time-series directory");
        }
    }
    Ok(())
}

pub(crate) fn parse_rows<T>(
    rows: Vec<Row>,
    what: &str,
    parse: impl Fn(&Row) -> Result<T, StorageError>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match parse(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, kind = what, "Skipping inventory row");
                None
            }
        })
        .collect()
}
