//! SNMP session adapter.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use snmp2::{AsyncSession, Oid, Pdu, Value};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::time::timeout;

use crate::snmp::{ObjectId, SnmpError, SnmpValue, VarBind};

/// First request id handed to a new session.
const STARTING_REQUEST_ID: i32 = 2;

/// Protocol version spoken to a device.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SnmpVersion {
    V1,
    #[default]
    V2c,
}

/// Request/response seam used by the walker and the batcher.
///
/// Implementations return owned bindings in request order. An `Err`
/// means the whole request failed; per-binding problems come back as
/// exception values.
#[async_trait::async_trait]
pub trait SnmpTransport: Send {
    /// Fetch the exact instances named by `oids`.
    async fn get(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError>;

    /// Fetch the lexicographic successor of each of `oids`.
    async fn get_next(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError>;
}

/// Request kinds issued on the wire.
enum Request<'a> {
    Get(&'a ObjectId),
    GetNext(&'a ObjectId),
    /// `GetBulk` with every OID a non-repeater: one successor per OID in a
    /// single round trip.
    NextBulk(&'a [ObjectId]),
}

/// SNMP client over an [`AsyncSession`].
///
/// Each request waits `timeout`; a request that times out is resent up to
/// `retries` more times, doubling the wait on every attempt.
pub struct SnmpClient {
    session: AsyncSession,
    target: String,
    version: SnmpVersion,
    timeout: Duration,
    retries: u32,
}

impl SnmpClient {
    /// Open a session to `target` (`host:port`).
    pub async fn connect(
        target: impl Into<String>,
        community: &str,
        version: SnmpVersion,
        timeout: Duration,
        retries: u32,
    ) -> Result<Self, SnmpError> {
        let target = target.into();
        let session = match version {
            SnmpVersion::V1 => {
                AsyncSession::new_v1(target.as_str(), community.as_bytes(), STARTING_REQUEST_ID)
                    .await
            }
            SnmpVersion::V2c => {
                AsyncSession::new_v2c(target.as_str(), community.as_bytes(), STARTING_REQUEST_ID)
                    .await
            }
        }
        .map_err(SnmpError::Connect)?;

        tracing::debug!(target = %target, version = %version, "SNMP session opened");

        Ok(Self {
            session,
            target,
            version,
            timeout,
            retries,
        })
    }

    async fn exchange(&mut self, request: &Request<'_>) -> Result<Vec<VarBind>, SnmpError> {
        let mut wait = self.timeout;
        let attempts = self.retries + 1;

        for attempt in 1..=attempts {
            match timeout(wait, self.send(request)).await {
                Ok(result) => return result,
                Err(_) => {
                    tracing::debug!(
                        target = %self.target,
                        attempt,
                        wait = ?wait,
                        "SNMP request timed out"
                    );
                    wait = wait.saturating_mul(2);
                }
            }
        }

        Err(SnmpError::Timeout { attempts })
    }

    async fn send(&mut self, request: &Request<'_>) -> Result<Vec<VarBind>, SnmpError> {
        match request {
            Request::Get(oid) => {
                let oid = to_wire(oid)?;
                let pdu = self.session.get(&oid).await.map_err(protocol_error)?;
                read_pdu(pdu)
            }
            Request::GetNext(oid) => {
                let oid = to_wire(oid)?;
                let pdu = self.session.getnext(&oid).await.map_err(protocol_error)?;
                read_pdu(pdu)
            }
            Request::NextBulk(oids) => {
                let wire = oids.iter().map(to_wire).collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Oid<'_>> = wire.iter().collect();
                let non_repeaters = u32::try_from(refs.len())
                    .map_err(|_| SnmpError::Protocol("too many oids in one request".into()))?;
                let pdu = self
                    .session
                    .getbulk(&refs, non_repeaters, 0)
                    .await
                    .map_err(protocol_error)?;
                read_pdu(pdu)
            }
        }
    }
}

impl std::fmt::Debug for SnmpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnmpClient")
            .field("target", &self.target)
            .field("version", &self.version)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SnmpTransport for SnmpClient {
    async fn get(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError> {
        let mut out = Vec::with_capacity(oids.len());
        for oid in oids {
            out.extend(self.exchange(&Request::Get(oid)).await?);
        }
        Ok(out)
    }

    async fn get_next(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError> {
        match self.version {
            SnmpVersion::V2c => self.exchange(&Request::NextBulk(oids)).await,
            // v1 has no GetBulk
            SnmpVersion::V1 => {
                let mut out = Vec::with_capacity(oids.len());
                for oid in oids {
                    out.extend(self.exchange(&Request::GetNext(oid)).await?);
                }
                Ok(out)
            }
        }
    }
}

// =============================================================================
// Wire conversion
// =============================================================================

fn to_wire(oid: &ObjectId) -> Result<Oid<'static>, SnmpError> {
    Oid::from(oid.arcs()).map_err(|e| SnmpError::InvalidOid(format!("{oid}: {e:?}")))
}

fn from_wire(oid: &Oid<'_>) -> Result<ObjectId, SnmpError> {
    oid.to_id_string().parse()
}

fn protocol_error(e: snmp2::Error) -> SnmpError {
    SnmpError::Protocol(format!("{e:?}"))
}

fn read_pdu(pdu: Pdu<'_>) -> Result<Vec<VarBind>, SnmpError> {
    if pdu.error_status != 0 {
        return Err(SnmpError::Protocol(format!(
            "error-status {} at index {}",
            pdu.error_status, pdu.error_index
        )));
    }

    pdu.varbinds
        .into_iter()
        .map(|(oid, value)| Ok(VarBind::new(from_wire(&oid)?, own_value(&value))))
        .collect()
}

fn own_value(value: &Value<'_>) -> SnmpValue {
    match value {
        Value::Integer(v) => SnmpValue::Integer(*v),
        Value::OctetString(bytes) => SnmpValue::OctetString(bytes.to_vec()),
        Value::ObjectIdentifier(oid) => match from_wire(oid) {
            Ok(oid) => SnmpValue::ObjectId(oid),
            Err(_) => SnmpValue::Other,
        },
        Value::IpAddress(addr) => SnmpValue::IpAddress(*addr),
        Value::Counter32(v) => SnmpValue::Counter32(*v),
        Value::Unsigned32(v) => SnmpValue::Unsigned32(*v),
        Value::Timeticks(v) => SnmpValue::Timeticks(*v),
        Value::Counter64(v) => SnmpValue::Counter64(*v),
        Value::Null => SnmpValue::Null,
        Value::NoSuchObject => SnmpValue::NoSuchObject,
        Value::NoSuchInstance => SnmpValue::NoSuchInstance,
        Value::EndOfMibView => SnmpValue::EndOfMibView,
        _ => SnmpValue::Other,
    }
}
