//! Device descriptors and scope selection.

use crate::snmp::SnmpVersion;
use crate::storage::{Row, SqlArg, StorageError};

const DEVICES_SQL: &str = "SELECT d.id, d.name, d.device_type_id, d.ip, d.community, \
     d.username, d.password, t.snmp_version \
     FROM devices d JOIN device_types t ON t.id = d.device_type_id \
     WHERE d.monitor";

/// Which devices a run covers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceScope {
    #[default]
    All,
    Id(i64),
    Name(String),
    DeviceType(i64),
}

/// Restrict "all devices" to types that carry templates of one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateLevel {
    Device,
    Iface,
}

/// Credentials for the protocols a device may be polled with.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub community: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A polled device, immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub device_type: i64,
    /// Host or IP address, without port.
    pub address: String,
    pub snmp_version: SnmpVersion,
    pub credentials: Credentials,
}

impl Device {
    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            id: int_field(row, "id")?,
            name: row.get("name").cloned().unwrap_or_default(),
            device_type: int_field(row, "device_type_id")?,
            address: text_field(row, "ip")?,
            snmp_version: parse_snmp_version(row.get("snmp_version").map(String::as_str)),
            credentials: Credentials {
                community: row.get("community").cloned().unwrap_or_default(),
                username: row.get("username").cloned(),
                password: row.get("password").cloned(),
            },
        })
    }
}

/// Map inventory spellings (`1`, `v1`, `2c`, `v2c`) to a version.
pub fn parse_snmp_version(raw: Option<&str>) -> SnmpVersion {
    match raw.map(str::trim) {
        Some("1" | "v1" | "V1") => SnmpVersion::V1,
        _ => SnmpVersion::V2c,
    }
}

/// Build the device selection for `scope`.
pub fn device_query(scope: &DeviceScope, level: Option<TemplateLevel>) -> (String, Vec<SqlArg>) {
    let mut sql = DEVICES_SQL.to_string();
    let mut args = Vec::new();

    match scope {
        DeviceScope::All => {}
        DeviceScope::Id(id) => {
            sql.push_str(" AND d.id = ?");
            args.push(SqlArg::Int(*id));
        }
        DeviceScope::Name(name) => {
            sql.push_str(" AND d.name = ?");
            args.push(name.as_str().into());
        }
        DeviceScope::DeviceType(t) => {
            sql.push_str(" AND d.device_type_id = ?");
            args.push(SqlArg::Int(*t));
        }
    }

    if let Some(level) = level
        && !matches!(scope, DeviceScope::Id(_))
    {
        let filter = match level {
            TemplateLevel::Device => "iface_type_id IS NULL",
            TemplateLevel::Iface => "iface_type_id IS NOT NULL",
        };
        sql.push_str(&format!(
            " AND d.device_type_id IN (SELECT DISTINCT device_type_id FROM snmp_templates \
             WHERE source = 'snmp' AND {filter})"
        ));
    }

    sql.push_str(" ORDER BY d.id");
    (sql, args)
}

pub(crate) fn int_field(row: &Row, name: &str) -> Result<i64, StorageError> {
    let raw = text_field(row, name)?;
    raw.trim()
        .parse()
        .map_err(|_| StorageError::InvalidData(format!("column {name}: not an integer: {raw}")))
}

pub(crate) fn text_field(row: &Row, name: &str) -> Result<String, StorageError> {
    row.get(name)
        .cloned()
        .ok_or_else(|| StorageError::InvalidData(format!("column {name} missing")))
}
