//! SNMP Polling Engine
//!
//! Resolves a device's OID templates into numeric samples over SNMP v1/v2c.
//!
//! # Components
//!
//! - [`ObjectId`] / [`SnmpValue`] / [`VarBind`]: owned protocol values
//! - [`SnmpTransport`]: get / get-next seam, implemented by [`SnmpClient`]
//! - [`Walker`]: column walk over get-next with prefix and loop guards
//! - [`Batcher`]: chunked get / get-next under a max-OIDs-per-request limit

mod batch;
mod client;
mod oid;
mod value;
mod walk;

pub use batch::{BatchMode, BatchOutcome, Batcher, DEFAULT_MAX_OIDS, Sample};
pub use client::{SnmpClient, SnmpTransport, SnmpVersion};
pub use oid::{ObjectId, format_suffix};
pub use value::{SnmpValue, VarBind};
pub use walk::{DEFAULT_MAX_ROWS, WalkOutcome, WalkRow, WalkStop, Walker};

use thiserror::Error;

/// Errors raised by the SNMP layer.
#[derive(Debug, Error)]
pub enum SnmpError {
    /// Identifier text could not be parsed.
    #[error("invalid oid {0}")]
    InvalidOid(String),

    /// Session could not be opened.
    #[error("snmp connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// No response within the timeout, after all retries.
    #[error("snmp request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Agent answered with an error or an unreadable PDU.
    #[error("snmp protocol error: {0}")]
    Protocol(String),

    /// Value cannot be read as a number.
    #[error("snmp value coercion failed: {0}")]
    Coercion(String),
}

impl SnmpError {
    /// True when the device never answered, as opposed to answering badly.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout { .. })
    }
}
