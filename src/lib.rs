//! Netharvest - Batch Network Telemetry
//!
//! One invocation runs one job over a device inventory: read values from
//! network equipment, normalize them, and write them to a round-robin
//! time-series store and a relational inventory. The `netharvest` binary
//! wraps the library with a CLI.
//!
//! # Architecture
//!
//! - **Pollers**: one [`DevicePoller`] per job, driven by a bounded [`WorkerPool`]
//! - **Protocols**: SNMP walk and batching, telnet command chains, RouterOS API
//! - **Normalization**: exact decimal scaling with sentinel filtering
//! - **Storage**: DuckDB inventory behind a backpressured mutation queue,
//!   round-robin files behind a create-or-update sink
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use netharvest::{
//!     AppConfig, DeviceDataPoller, RunContext, StorageBuilder, UdpSnmpConnector, WorkerPool,
//! };
//!
//! let handles = StorageBuilder::new("netharvest.db").build()?;
//! let ctx = RunContext::new(poll_time, sink, handles.mutations(), rows, settings)
//!     .with_templates(templates);
//! let snmp = Arc::new(UdpSnmpConnector::from_config(&config.snmp));
//! let report = WorkerPool::start(Arc::new(DeviceDataPoller::new(ctx, snmp)), 16, devices)
//!     .wait()
//!     .await;
//! handles.shutdown()?;
//! ```

pub mod config;
pub mod context;
pub mod inventory;
pub mod normalize;
pub mod poller;
pub mod routeros;
pub mod snmp;
pub mod storage;
pub mod telnet;

pub use config::{AppConfig, ConfigError};
pub use context::RunContext;
pub use inventory::{Device, DeviceScope, Template, TemplateCache};
pub use normalize::Normalizer;
pub use poller::{
    DeviceDataPoller, DevicePoller, EponPoller, IfaceDataPoller, IfaceDiscoverPoller, PollError,
    PollSummary, PoolReport, TsImportPoller, UdpSnmpConnector, WirelessPoller, WorkerPool,
};
pub use storage::{
    MutationSender, RowReader, RrdFileStore, StorageBuilder, StorageError, StorageHandles,
    TimeSeriesSink,
};
