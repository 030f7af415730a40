//! Polling Jobs
//!
//! Every job is a [`DevicePoller`] run over its device list by the
//! [`WorkerPool`]. Jobs share one [`RunContext`](crate::context::RunContext).
//!
//! # Jobs
//!
//! - [`DeviceDataPoller`]: device-level templates, batched get-next
//! - [`IfaceDataPoller`]: interface templates x known instances, batched get
//! - [`IfaceDiscoverPoller`]: interface table walk, inventory upserts
//! - [`EponPoller`]: ONU levels over SNMP, ONU status over telnet
//! - [`WirelessPoller`]: RouterOS registration tables, link upserts
//! - [`TsImportPoller`]: relational values into the time-series store

mod device_data;
mod epon;
mod iface_data;
mod iface_discover;
mod pool;
mod traits;
mod ts_import;
mod wireless;

#[cfg(test)]
pub(crate) mod testing;

pub use device_data::DeviceDataPoller;
pub use epon::{EponPoller, Olt, OnuLevels, load_olts};
pub use iface_data::IfaceDataPoller;
pub use iface_discover::IfaceDiscoverPoller;
pub use pool::{PoolReport, WorkerPool};
pub use traits::{
    DevicePoller, PollError, PollSummary, SnmpConnector, UdpSnmpConnector,
};
pub use ts_import::{ImportPage, TsImportPoller};
pub use wireless::{LinkRegistry, RadioIface, WirelessPoller, load_radio_ifaces};

use std::path::Path;

use rust_decimal::Decimal;

use crate::context::RunContext;
use crate::storage::TsConfig;

/// Write one time-series point, counting it as a sample or a drop.
///
/// A failed write costs that sample only.
pub(crate) fn record_point(
    ctx: &RunContext,
    path: &Path,
    config: &TsConfig,
    values: &[Option<Decimal>],
    summary: &mut PollSummary,
) {
    match ctx.sink.store(path, config, ctx.poll_time, values) {
        Ok(_) => summary.samples += 1,
        Err(e) => {
            summary.dropped += 1;
            tracing::warn!(path = %path.display(), error = %e, "Time-series update failed");
        }
    }
}
