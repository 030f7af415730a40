//! Per-interface SNMP values for known interface instances.

use std::sync::Arc;

use crate::context::RunContext;
use crate::inventory::{Device, IfaceType, load_ifaces};
use crate::normalize::Normalizer;
use crate::poller::{DevicePoller, PollError, PollSummary, SnmpConnector, record_point};
use crate::snmp::{BatchMode, Batcher, ObjectId};

/// Which template and interface a requested instance belongs to.
#[derive(Debug, Clone, Copy)]
struct Slot {
    iface_type: IfaceType,
    template: usize,
    iface_id: i64,
}

pub struct IfaceDataPoller<C> {
    ctx: RunContext,
    snmp: Arc<C>,
    normalizer: Normalizer,
}

impl<C: SnmpConnector> IfaceDataPoller<C> {
    pub fn new(ctx: RunContext, snmp: Arc<C>) -> Self {
        Self {
            ctx,
            snmp,
            normalizer: Normalizer::new(),
        }
    }

    /// Templates x interfaces of every interface type the device carries.
    fn requests(
        &self,
        device: &Device,
        summary: &mut PollSummary,
    ) -> Result<Vec<(ObjectId, Slot)>, PollError> {
        let mut requests = Vec::new();

        for iface_type in self.ctx.templates.iface_types(device.device_type) {
            let templates = self.ctx.templates.get(device.device_type, iface_type);
            let ifaces = load_ifaces(self.ctx.rows.as_ref(), device.id, iface_type)?;
            if ifaces.is_empty() {
                continue;
            }

            for (t, template) in templates.iter().enumerate() {
                let column = match template.oid() {
                    Ok(oid) => oid,
                    Err(e) => {
                        summary.dropped += 1;
                        tracing::warn!(template = %template.path, error = %e, "Bad template OID");
                        continue;
                    }
                };
                for iface in &ifaces {
                    let Some(index) = parse_index(&iface.index) else {
                        summary.dropped += 1;
                        tracing::warn!(
                            iface = iface.id,
                            index = %iface.index,
                            "Bad interface index"
                        );
                        continue;
                    };
                    requests.push((
                        column.join(&index),
                        Slot {
                            iface_type,
                            template: t,
                            iface_id: iface.id,
                        },
                    ));
                }
            }
        }

        Ok(requests)
    }
}

/// Dotted instance suffix (`"3"`, `"1.4"`) as arcs.
fn parse_index(raw: &str) -> Option<Vec<u64>> {
    let raw = raw.trim().trim_start_matches('.');
    if raw.is_empty() {
        return None;
    }
    raw.split('.').map(|arc| arc.parse().ok()).collect()
}

#[async_trait::async_trait]
impl<C: SnmpConnector> DevicePoller for IfaceDataPoller<C> {
    type Device = Device;

    fn name(&self) -> &str {
        "iface-data"
    }

    fn describe(&self, device: &Device) -> String {
        format!("{} ({})", device.name, device.address)
    }

    async fn poll(&self, device: Device) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();
        let requests = self.requests(&device, &mut summary)?;
        if requests.is_empty() {
            return Ok(summary);
        }

        let mut transport = self
            .snmp
            .open(
                &device.address,
                &device.credentials.community,
                device.snmp_version,
            )
            .await?;

        let batcher = Batcher::new(BatchMode::Get, self.ctx.settings.snmp.max_oids);
        let outcome = batcher.run(transport.as_mut(), &requests).await;
        summary.dropped += outcome.dropped;

        for sample in outcome.samples {
            let slot = sample.tag;
            let templates = self.ctx.templates.get(device.device_type, slot.iface_type);
            let template = &templates[slot.template];
            let Some(value) = self.normalizer.normalize(sample.value, template.rate) else {
                summary.dropped += 1;
                continue;
            };
            let path = self.ctx.sink.path_for(&template.path, slot.iface_id);
            record_point(&self.ctx, &path, &template.ts_config(), &[Some(value)], &mut summary);
        }

        match outcome.error {
            Some(e) => Err(e.into()),
            None => Ok(summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::config::AppConfig;
    use crate::inventory::{Credentials, Template, TemplateCache};
    use crate::poller::testing::{FakeSnmp, ScriptedAgent, TestBed};
    use crate::snmp::{SnmpValue, SnmpVersion};
    use crate::storage::DataSourceKind;

    const SEED: &[&str] = &[
        "INSERT INTO device_ifaces (id, device_id, oid, name, speed, iface_type_id) VALUES \
         (100, 1, '1', 'ge-0/0/1', 1000000000, 6), \
         (101, 1, '2', 'ge-0/0/2', 1000000000, 6), \
         (102, 1, '3', 'ge-0/0/3', 1000000000, 6), \
         (200, 2, '1', 'eth0', 100000000, 6)",
    ];

    fn counter(path: &str, query: &str) -> Template {
        Template {
            path: path.to_string(),
            query: query.to_string(),
            rate: Decimal::from_str("8").unwrap(),
            counter: DataSourceKind::Counter,
            min: Some(0.0),
            max: None,
            step: 300,
            threshold: None,
        }
    }

    fn cache() -> TemplateCache {
        let mut cache = TemplateCache::new();
        cache.insert(3, IfaceType(6), counter("iface/in", ".1.3.6.1.2.1.31.1.1.1.6"));
        cache.insert(3, IfaceType(6), counter("iface/out", ".1.3.6.1.2.1.31.1.1.1.10"));
        cache
    }

    fn device(id: i64) -> Device {
        Device {
            id,
            name: format!("core-{id}"),
            device_type: 3,
            address: format!("10.1.0.{id}"),
            snmp_version: SnmpVersion::V2c,
            credentials: Credentials {
                community: "ro".into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("3"), Some(vec![3]));
        assert_eq!(parse_index(".1.4"), Some(vec![1, 4]));
        assert_eq!(parse_index(""), None);
        assert_eq!(parse_index("eth0"), None);
    }

    #[tokio::test]
    async fn test_templates_times_instances_in_chunks() {
        let mut settings = AppConfig::default();
        settings.snmp.max_oids = 4;
        let bed = TestBed::with_settings(SEED, settings).templates(cache());

        let snmp = FakeSnmp::default().agent(
            "10.1.0.1",
            ScriptedAgent::new(&[
                (".1.3.6.1.2.1.31.1.1.1.6.1", SnmpValue::Counter64(18_446_744_073_709_551_000)),
                (".1.3.6.1.2.1.31.1.1.1.6.2", SnmpValue::Counter64(10)),
                (".1.3.6.1.2.1.31.1.1.1.10.1", SnmpValue::Counter64(3)),
                (".1.3.6.1.2.1.31.1.1.1.10.2", SnmpValue::Counter64(4)),
                (".1.3.6.1.2.1.31.1.1.1.10.3", SnmpValue::Counter64(5)),
            ]),
        );
        let poller = IfaceDataPoller::new(bed.ctx.clone(), Arc::new(snmp));

        let summary = poller.poll(device(1)).await.unwrap();
        // in.3 is missing on the agent
        assert_eq!(summary.samples, 5);
        assert_eq!(summary.dropped, 1);

        let big = bed.ts.updates(&bed.ts_path("iface/in/0000000100"));
        assert_eq!(
            big,
            vec![vec![Some(Decimal::from_str("147573952589676408000").unwrap())]]
        );
        assert_eq!(
            bed.ts.updates(&bed.ts_path("iface/out/0000000102")),
            vec![vec![Some(Decimal::from(40))]]
        );
        assert!(bed.ts.updates(&bed.ts_path("iface/in/0000000102")).is_empty());

        drop(poller);
        bed.finish();
    }

    #[tokio::test]
    async fn test_device_without_instances_skips_session() {
        let bed = TestBed::new(SEED).templates(cache());
        let snmp = Arc::new(FakeSnmp::default());
        let poller = IfaceDataPoller::new(bed.ctx.clone(), Arc::clone(&snmp));

        let summary = poller.poll(device(9)).await.unwrap();
        assert_eq!(summary, PollSummary::default());
        assert!(snmp.opened.lock().unwrap().is_empty());

        drop(poller);
        bed.finish();
    }
}
