//! Core poller traits and types.

use std::time::Duration;

use thiserror::Error;

use crate::config::SnmpConfig;
use crate::routeros::ApiError;
use crate::snmp::{SnmpClient, SnmpError, SnmpTransport, SnmpVersion};
use crate::storage::{StorageError, TimeSeriesError};
use crate::telnet::ChainFailure;

/// Why one device could not be polled.
#[derive(Debug, Error)]
pub enum PollError {
    /// Device unreachable or silent.
    #[error("connection error: {0}")]
    Connection(String),

    /// Device answered, but not the way the job expects.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A value could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Failed to hand a result to the relational store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("time-series error: {0}")]
    TimeSeries(#[from] TimeSeriesError),
}

impl PollError {
    /// Unreachable devices are routine; these log at info.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<SnmpError> for PollError {
    fn from(e: SnmpError) -> Self {
        match e {
            e if e.is_connection() => Self::Connection(e.to_string()),
            SnmpError::Coercion(msg) => Self::Parse(msg),
            e => Self::Protocol(e.to_string()),
        }
    }
}

impl From<ChainFailure> for PollError {
    fn from(e: ChainFailure) -> Self {
        if e.is_connection() {
            Self::Connection(e.to_string())
        } else {
            Self::Protocol(e.to_string())
        }
    }
}

impl From<ApiError> for PollError {
    fn from(e: ApiError) -> Self {
        if e.is_connection() {
            Self::Connection(e.to_string())
        } else {
            Self::Protocol(e.to_string())
        }
    }
}

/// What one device produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Time-series points written.
    pub samples: usize,
    /// Statements queued for the relational store.
    pub mutations: usize,
    /// Values dropped (coercion failures, sentinels, malformed rows).
    pub dropped: usize,
}

impl PollSummary {
    pub fn merge(&mut self, other: PollSummary) {
        self.samples += other.samples;
        self.mutations += other.mutations;
        self.dropped += other.dropped;
    }
}

/// Job logic for one device, driven by the worker pool.
///
/// `poll` owns the device end to end: open the session, read, normalize,
/// persist. An `Err` abandons this device only.
#[async_trait::async_trait]
pub trait DevicePoller: Send + Sync + 'static {
    /// Work item handed to each worker.
    type Device: Send + 'static;

    /// Job name used in logs.
    fn name(&self) -> &str;

    /// Short label of a device for logs.
    fn describe(&self, device: &Self::Device) -> String;

    async fn poll(&self, device: Self::Device) -> Result<PollSummary, PollError>;
}

// =============================================================================
// SNMP sessions
// =============================================================================

/// Opens SNMP sessions; swapped for scripted agents in tests.
#[async_trait::async_trait]
pub trait SnmpConnector: Send + Sync + 'static {
    async fn open(
        &self,
        host: &str,
        community: &str,
        version: SnmpVersion,
    ) -> Result<Box<dyn SnmpTransport>, SnmpError>;
}

/// UDP sessions through [`SnmpClient`].
#[derive(Debug, Clone)]
pub struct UdpSnmpConnector {
    port: u16,
    timeout: Duration,
    retries: u32,
}

impl UdpSnmpConnector {
    pub fn new(port: u16, timeout: Duration, retries: u32) -> Self {
        Self {
            port,
            timeout,
            retries,
        }
    }

    pub fn from_config(config: &SnmpConfig) -> Self {
        Self::new(config.port, config.timeout, config.retries)
    }
}

#[async_trait::async_trait]
impl SnmpConnector for UdpSnmpConnector {
    async fn open(
        &self,
        host: &str,
        community: &str,
        version: SnmpVersion,
    ) -> Result<Box<dyn SnmpTransport>, SnmpError> {
        let client = SnmpClient::connect(
            format!("{host}:{}", self.port),
            community,
            version,
            self.timeout,
            self.retries,
        )
        .await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let e: PollError = SnmpError::Timeout { attempts: 2 }.into();
        assert!(e.is_connection());

        let e: PollError = SnmpError::Coercion("octet string 'n/a'".into()).into();
        assert!(matches!(e, PollError::Parse(_)));

        let e: PollError = SnmpError::Protocol("error-status 2".into()).into();
        assert!(matches!(e, PollError::Protocol(_)));

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let e: PollError = ChainFailure::Connect(refused).into();
        assert!(e.is_connection());

        let e: PollError = ChainFailure::Eof.into();
        assert!(!e.is_connection());

        let e: PollError = ApiError::Login("bad password".into()).into();
        assert!(matches!(e, PollError::Protocol(_)));
        let e: PollError = StorageError::ChannelSend.into();
        assert!(!e.is_connection());
    }

    #[test]
    fn test_summary_merge() {
        let mut total = PollSummary::default();
        total.merge(PollSummary {
            samples: 3,
            mutations: 1,
            dropped: 0,
        });
        total.merge(PollSummary {
            samples: 2,
            mutations: 0,
            dropped: 4,
        });
        assert_eq!(
            total,
            PollSummary {
                samples: 5,
                mutations: 1,
                dropped: 4
            }
        );
    }
}
