//! Interface discovery: walk the interface table into inventory.

use std::sync::Arc;
use std::sync::LazyLock;

use crate::context::RunContext;
use crate::inventory::Device;
use crate::poller::{DevicePoller, PollError, PollSummary, SnmpConnector};
use crate::snmp::{ObjectId, SnmpValue, WalkStop, Walker, format_suffix};
use crate::storage::SqlArg;

static IF_DESCR: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 2, 1, 2, 2, 1, 2]));
static IF_TYPE: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 2, 1, 2, 2, 1, 3]));
static IF_SPEED: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 2, 1, 2, 2, 1, 5]));

const UPSERT_IFACE: &str = "INSERT INTO device_ifaces (device_id, oid, name, speed, iface_type_id) \
     VALUES (?, ?, ?, ?, ?) \
     ON CONFLICT (device_id, oid) DO UPDATE SET \
     name = EXCLUDED.name, speed = EXCLUDED.speed, iface_type_id = EXCLUDED.iface_type_id, \
     updated_at = now()";

pub struct IfaceDiscoverPoller<C> {
    ctx: RunContext,
    snmp: Arc<C>,
}

impl<C: SnmpConnector> IfaceDiscoverPoller<C> {
    pub fn new(ctx: RunContext, snmp: Arc<C>) -> Self {
        Self { ctx, snmp }
    }
}

#[async_trait::async_trait]
impl<C: SnmpConnector> DevicePoller for IfaceDiscoverPoller<C> {
    type Device = Device;

    fn name(&self) -> &str {
        "iface-discover"
    }

    fn describe(&self, device: &Device) -> String {
        format!("{} ({})", device.name, device.address)
    }

    async fn poll(&self, device: Device) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();
        let mut transport = self
            .snmp
            .open(
                &device.address,
                &device.credentials.community,
                device.snmp_version,
            )
            .await?;

        let outcome = Walker::new(IF_DESCR.clone())
            .column(IF_TYPE.clone())
            .column(IF_SPEED.clone())
            .max_rows(self.ctx.settings.snmp.max_walk_rows)
            .run(transport.as_mut())
            .await;

        for row in &outcome.rows {
            let iface_type = match row.value(1).to_decimal() {
                Ok(t) => SqlArg::from(t),
                Err(e) => {
                    summary.dropped += 1;
                    tracing::warn!(
                        device = %device.name,
                        index = ?row.index,
                        error = %e,
                        "Interface without type"
                    );
                    continue;
                }
            };
            let speed = match row.value(2) {
                SnmpValue::NoSuchInstance => SqlArg::Null,
                value => value.to_decimal().map_or(SqlArg::Null, SqlArg::from),
            };

            self.ctx
                .mutations
                .queue(
                    UPSERT_IFACE,
                    vec![
                        SqlArg::Int(device.id),
                        format_suffix(&row.index).into(),
                        row.value(0).to_text().trim().to_string().into(),
                        speed,
                        iface_type,
                    ],
                )
                .await?;
            summary.mutations += 1;
        }

        tracing::debug!(
            device = %device.name,
            interfaces = outcome.rows.len(),
            "Interface walk done"
        );

        match outcome.stop {
            WalkStop::Error(e) => Err(e.into()),
            _ => Ok(summary),
        }
    }
}
