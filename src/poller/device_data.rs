//! Device-level SNMP values.
//!
//! A device template names an instance OID such as `sysUpTime.0`. The job
//! asks for the successor of its column, so agents that number scalars
//! differently still answer.

use std::sync::Arc;

use crate::context::RunContext;
use crate::inventory::{Device, IfaceType};
use crate::normalize::Normalizer;
use crate::poller::{DevicePoller, PollError, PollSummary, SnmpConnector, record_point};
use crate::snmp::{BatchMode, Batcher, ObjectId};

pub struct DeviceDataPoller<C> {
    ctx: RunContext,
    snmp: Arc<C>,
    normalizer: Normalizer,
}

impl<C: SnmpConnector> DeviceDataPoller<C> {
    pub fn new(ctx: RunContext, snmp: Arc<C>) -> Self {
        Self {
            ctx,
            snmp,
            normalizer: Normalizer::new(),
        }
    }
}

#[async_trait::async_trait]
impl<C: SnmpConnector> DevicePoller for DeviceDataPoller<C> {
    type Device = Device;

    fn name(&self) -> &str {
        "device-data"
    }

    fn describe(&self, device: &Device) -> String {
        format!("{} ({})", device.name, device.address)
    }

    async fn poll(&self, device: Device) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();
        let templates = self.ctx.templates.get(device.device_type, IfaceType::DEVICE);
        if templates.is_empty() {
            return Ok(summary);
        }

        // tagged with (template index, column)
        let mut requests: Vec<(ObjectId, (usize, ObjectId))> = Vec::with_capacity(templates.len());
        for (i, template) in templates.iter().enumerate() {
            match template.oid() {
                Ok(oid) => {
                    let column = oid.parent();
                    requests.push((column.clone(), (i, column)));
                }
                Err(e) => {
                    summary.dropped += 1;
                    tracing::warn!(template = %template.path, error = %e, "Bad template OID");
                }
            }
        }

        let mut transport = self
            .snmp
            .open(
                &device.address,
                &device.credentials.community,
                device.snmp_version,
            )
            .await?;

        let batcher = Batcher::new(BatchMode::GetNext, self.ctx.settings.snmp.max_oids);
        let outcome = batcher.run(transport.as_mut(), &requests).await;
        summary.dropped += outcome.dropped;

        for sample in outcome.samples {
            let (i, column) = &sample.tag;
            let template = &templates[*i];
            if !sample.oid.starts_with(column) {
                // successor fell outside the column: no such object here
                summary.dropped += 1;
                tracing::debug!(
                    device = %device.name,
                    oid = %sample.oid,
                    "Successor outside column"
                );
                continue;
            }

            let Some(value) = self.normalizer.normalize(sample.value, template.rate) else {
                summary.dropped += 1;
                continue;
            };
            let path = self.ctx.sink.path_for(&template.path, device.id);
            record_point(&self.ctx, &path, &template.ts_config(), &[Some(value)], &mut summary);
        }

        match outcome.error {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }
}
