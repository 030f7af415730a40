//! Inventory schema definitions.

use duckdb::Connection;

use crate::storage::StorageError;

/// Device types and the SNMP version their members speak.
pub const DEVICE_TYPES_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS device_types (
    id           INTEGER PRIMARY KEY,
    name         VARCHAR NOT NULL,
    snmp_version VARCHAR NOT NULL DEFAULT '2c'
);
"#;

/// Polled devices. Only rows with `monitor = true` are selected by jobs.
pub const DEVICES_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id             INTEGER PRIMARY KEY,
    name           VARCHAR NOT NULL,
    device_type_id INTEGER NOT NULL,
    ip             VARCHAR NOT NULL,
    community      VARCHAR,
    username       VARCHAR,
    password       VARCHAR,
    monitor        BOOLEAN NOT NULL DEFAULT true
);
"#;

/// Interfaces found by discovery; `oid` holds the ifIndex.
pub const DEVICE_IFACES_TABLE_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS device_ifaces_id_seq;
CREATE TABLE IF NOT EXISTS device_ifaces (
    id            BIGINT PRIMARY KEY DEFAULT NEXTVAL('device_ifaces_id_seq'),
    device_id     INTEGER NOT NULL,
    oid           VARCHAR NOT NULL,
    name          VARCHAR NOT NULL,
    speed         BIGINT,
    iface_type_id INTEGER NOT NULL,
    created_at    TIMESTAMP DEFAULT current_timestamp,
    updated_at    TIMESTAMP DEFAULT current_timestamp,
    UNIQUE (device_id, oid)
);
"#;

/// OID templates.
///
/// `iface_type_id` is NULL for device-level templates. `source = 'sql'`
/// marks templates whose `query` is a relational value query instead of an
/// OID; such templates are consumed by the time-series import.
pub const SNMP_TEMPLATES_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS snmp_templates (
    id             INTEGER PRIMARY KEY,
    device_type_id INTEGER,
    iface_type_id  INTEGER,
    shared         VARCHAR NOT NULL,
    name           VARCHAR NOT NULL,
    query          VARCHAR NOT NULL,
    rate           DOUBLE NOT NULL DEFAULT 1,
    counter_type   VARCHAR NOT NULL DEFAULT 'GAUGE',
    min            DOUBLE,
    max            DOUBLE,
    step           INTEGER NOT NULL DEFAULT 300,
    threshold      DOUBLE,
    source         VARCHAR NOT NULL DEFAULT 'snmp'
);
"#;

/// EPON OLTs and the ONU status table they feed.
pub const EPON_TABLES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS epon (
    id        INTEGER PRIMARY KEY,
    name      VARCHAR NOT NULL,
    ip        VARCHAR NOT NULL,
    community VARCHAR NOT NULL,
    username  VARCHAR NOT NULL,
    password  VARCHAR NOT NULL,
    country   VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS onu_status (
    epon_id      INTEGER NOT NULL,
    interface    VARCHAR NOT NULL,
    name         VARCHAR,
    mac          VARCHAR,
    tx           BIGINT,
    rx           BIGINT,
    distance     INTEGER,
    rtt          INTEGER,
    dereg_reason VARCHAR,
    macs         VARCHAR,
    updated_at   TIMESTAMP DEFAULT current_timestamp,
    PRIMARY KEY (epon_id, interface)
);
"#;

/// RouterOS wireless interfaces, the links between them and newly seen
/// boards.
pub const ROUTEROS_TABLES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS mt_ifaces (
    id         INTEGER PRIMARY KEY,
    device_id  INTEGER NOT NULL,
    name       VARCHAR NOT NULL,
    radio_name VARCHAR NOT NULL,
    mode       VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS mt_links (
    mt_iface1_id INTEGER NOT NULL,
    mt_iface2_id INTEGER NOT NULL,
    s1           INTEGER,
    s1_ch0       INTEGER,
    s1_ch1       INTEGER,
    ccq1         INTEGER,
    rate1        INTEGER,
    prev_byte1   BIGINT,
    diff_byte1   BIGINT DEFAULT 0,
    s2           INTEGER,
    s2_ch0       INTEGER,
    s2_ch1       INTEGER,
    ccq2         INTEGER,
    rate2        INTEGER,
    prev_byte2   BIGINT,
    diff_byte2   BIGINT DEFAULT 0,
    updated_at   TIMESTAMP DEFAULT current_timestamp,
    PRIMARY KEY (mt_iface1_id, mt_iface2_id)
);
CREATE TABLE IF NOT EXISTS mt_new_boards (
    name       VARCHAR PRIMARY KEY,
    last_ip    VARCHAR,
    created_at TIMESTAMP DEFAULT current_timestamp,
    updated_at TIMESTAMP DEFAULT current_timestamp
);
"#;

/// Initialize the database schema.
///
/// Creates all tables and sequences if they don't exist.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(DEVICE_TYPES_TABLE_DDL)?;
    conn.execute_batch(DEVICES_TABLE_DDL)?;
    conn.execute_batch(DEVICE_IFACES_TABLE_DDL)?;
    conn.execute_batch(SNMP_TEMPLATES_TABLE_DDL)?;
    conn.execute_batch(EPON_TABLES_DDL)?;
    conn.execute_batch(ROUTEROS_TABLES_DDL)?;

    tracing::info!("Database schema initialized");
    Ok(())
}
