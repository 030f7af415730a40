//! Variable bindings and numeric coercion.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::snmp::{ObjectId, SnmpError};

/// Owned copy of an SNMP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectId(ObjectId),
    IpAddress([u8; 4]),
    Counter32(u32),
    Unsigned32(u32),
    Timeticks(u32),
    Counter64(u64),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    /// Any encoding this crate does not interpret.
    Other,
}

impl SnmpValue {
    /// True for the v2 exception markers a device returns in place of data.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            Self::NoSuchObject | Self::NoSuchInstance | Self::EndOfMibView
        )
    }

    /// Coerce to a number.
    ///
    /// Octet strings carry decimal text; every integer encoding is taken
    /// as-is. Anything else cannot be a sample.
    pub fn to_decimal(&self) -> Result<Decimal, SnmpError> {
        match self {
            Self::OctetString(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                Decimal::from_str(text.trim())
                    .map_err(|e| SnmpError::Coercion(format!("octet string '{text}': {e}")))
            }
            Self::Integer(v) => Ok(Decimal::from(*v)),
            Self::Counter32(v) | Self::Unsigned32(v) | Self::Timeticks(v) => Ok(Decimal::from(*v)),
            Self::Counter64(v) => Ok(Decimal::from(*v)),
            other => Err(SnmpError::Coercion(format!("not a numeric value: {other:?}"))),
        }
    }

    /// Textual form used for names, descriptions and raw level readings.
    pub fn to_text(&self) -> String {
        match self {
            Self::OctetString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Integer(v) => v.to_string(),
            Self::Counter32(v) | Self::Unsigned32(v) | Self::Timeticks(v) => v.to_string(),
            Self::Counter64(v) => v.to_string(),
            Self::ObjectId(oid) => oid.to_string(),
            Self::IpAddress([a, b, c, d]) => format!("{a}.{b}.{c}.{d}"),
            Self::Null => String::new(),
            other => format!("{other:?}"),
        }
    }

    /// Raw octets, for values such as MAC addresses.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::OctetString(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// One `(oid, value)` pair of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: ObjectId,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: ObjectId, value: SnmpValue) -> Self {
        Self { oid, value }
    }
}
