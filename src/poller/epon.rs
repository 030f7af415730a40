//! EPON OLT scrape.
//!
//! Optical levels of every ONU come from one SNMP table walk and go to the
//! time-series store. ONU status (distance, RTT, deregistration reason,
//! MACs learned behind the ONU) comes from the OLT CLI over telnet and is
//! upserted into `onu_status`.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;

use crate::context::RunContext;
use crate::inventory::{int_field, parse_rows, text_field};
use crate::normalize::{EPON_NO_SIGNAL, Normalizer};
use crate::poller::{DevicePoller, PollError, PollSummary, SnmpConnector, record_point};
use crate::snmp::{ObjectId, SnmpValue, SnmpVersion, WalkRow, WalkStop, Walker};
use crate::storage::{DataSourceKind, Row, RowSource, SqlArg, StorageError, TsConfig};
use crate::telnet::{
    ActiveOnuGrammar, Connector, MacTableGrammar, Script, SessionOptions, TelnetSession,
};

const OLTS_SQL: &str = "SELECT id, name, ip, community, username, password FROM epon \
     WHERE name NOT LIKE 'fake%' AND id > 0 AND country = ?";

const UPSERT_ONU: &str = "INSERT INTO onu_status \
     (epon_id, interface, mac, tx, rx, distance, rtt, dereg_reason, macs) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT (epon_id, interface) DO UPDATE SET \
     mac = EXCLUDED.mac, tx = EXCLUDED.tx, rx = EXCLUDED.rx, distance = EXCLUDED.distance, \
     rtt = EXCLUDED.rtt, dereg_reason = EXCLUDED.dereg_reason, macs = EXCLUDED.macs, \
     updated_at = now()";

// BDCOM enterprise MIB
static ONU_NAME: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 4, 1, 3320, 9, 64, 4, 1, 1, 2]));
static ONU_MAC: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 4, 1, 3320, 101, 10, 1, 1, 3]));
static ONU_TX: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 4, 1, 3320, 101, 10, 5, 1, 5]));
static PON_RX: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 4, 1, 3320, 9, 183, 1, 1, 5]));
static PON_RX_ALT: LazyLock<ObjectId> =
    LazyLock::new(|| ObjectId::from_arcs([1u64, 3, 6, 1, 4, 1, 3320, 101, 108, 1, 3]));

static ONU_IFACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(EPON\d+/\d+:\d+)$").expect("onu interface regex"));

/// Levels are reported in tenths of a dBm.
const LEVEL_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 1);
const LEVEL_STEP: u64 = 300;
const LEVEL_MIN: f64 = -50.0;
const LEVEL_MAX: f64 = 0.0;

/// Longest MAC list the status table is sized for.
const MACS_WARN_LEN: usize = 255;

// =============================================================================
// Inventory
// =============================================================================

/// An OLT to scrape.
#[derive(Clone, PartialEq, Eq)]
pub struct Olt {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub community: String,
    pub username: String,
    pub password: String,
}

impl Olt {
    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            id: int_field(row, "id")?,
            name: text_field(row, "name")?,
            address: text_field(row, "ip")?,
            community: text_field(row, "community")?,
            username: text_field(row, "username")?,
            password: text_field(row, "password")?,
        })
    }
}

impl std::fmt::Debug for Olt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Olt")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// OLTs of one country, optionally narrowed to one name. Placeholder rows
/// (`fake*` names, non-positive ids) are never returned.
pub fn load_olts(
    source: &dyn RowSource,
    country: &str,
    name: Option<&str>,
) -> Result<Vec<Olt>, StorageError> {
    let mut sql = OLTS_SQL.to_string();
    let mut args = vec![SqlArg::from(country)];
    if let Some(name) = name {
        sql.push_str(" AND name = ?");
        args.push(name.into());
    }
    sql.push_str(" ORDER BY id");

    let olts = parse_rows(source.select_rows(&sql, &args)?, "olt", Olt::from_row);
    tracing::info!(count = olts.len(), country, "OLTs loaded");
    Ok(olts)
}

// =============================================================================
// ONU levels
// =============================================================================

/// Optical levels of one ONU in raw tenths of a dBm. A level the OLT
/// could not measure is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnuLevels {
    /// Upper-cased interface, e.g. `EPON0/1:4`.
    pub interface: String,
    /// `AA:BB:CC:DD:EE:FF`, empty if the OLT did not report it.
    pub mac: String,
    pub tx: Option<Decimal>,
    pub rx: Option<Decimal>,
}

impl OnuLevels {
    /// Build from one walked row (name, MAC, ONU level, PON level, PON
    /// level alternate). Rows of non-ONU interfaces yield `None`.
    fn from_row(row: &WalkRow, normalizer: &Normalizer) -> Option<Self> {
        let name = row.value(0).to_text();
        let interface = ONU_IFACE_RE.captures(name.trim())?[1].to_uppercase();

        let level = |value: &SnmpValue| {
            value
                .to_decimal()
                .ok()
                .filter(|raw| !normalizer.is_sentinel(*raw))
        };
        // some firmwares report 1 in the PON column and the level in the
        // alternate one
        let pon = row.value(3).to_decimal().ok();
        let rx = if pon == Some(Decimal::ONE) {
            level(row.value(4))
        } else {
            level(row.value(3))
        };

        Some(Self {
            interface,
            mac: row.value(1).as_bytes().map(mac_from_bytes).unwrap_or_default(),
            tx: level(row.value(2)),
            rx,
        })
    }

    /// File name of this ONU's series: the MAC, lower-case, no separators.
    pub fn file_name(&self) -> String {
        self.mac.replace(':', "").to_lowercase()
    }
}

fn mac_from_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn level_config() -> TsConfig {
    TsConfig::new(LEVEL_STEP)
        .data_source("onu", DataSourceKind::Gauge, Some(LEVEL_MIN), Some(LEVEL_MAX))
        .data_source("pon", DataSourceKind::Gauge, Some(LEVEL_MIN), Some(LEVEL_MAX))
}

fn login_script(olt: &Olt) -> Script {
    Script::new()
        .expect(["sername: "])
        .send_line(olt.username.as_str())
        .expect(["assword: "])
        .send_line(olt.password.as_str())
        .expect([">"])
        .send_line("enable")
        .expect(["assword:", "#"])
        .send_line(olt.password.as_str())
        .expect(["#"])
}

fn command(text: impl Into<String>) -> Script {
    Script::new().send_line(text).read_until(b'#')
}

/// The session's failure as a poll error, `what` naming the failed step.
fn chain_error<C: Connector>(session: &TelnetSession<C>, what: &str) -> Option<PollError> {
    session.failure().map(|failure| {
        if failure.is_connection() {
            PollError::Connection(format!("{what}: {failure}"))
        } else {
            PollError::Protocol(format!("{what}: {failure}"))
        }
    })
}

// =============================================================================
// Poller
// =============================================================================

pub struct EponPoller<S, T> {
    ctx: RunContext,
    snmp: Arc<S>,
    telnet: T,
    normalizer: Normalizer,
}

impl<S, T> EponPoller<S, T>
where
    S: SnmpConnector,
    T: Connector + Clone + 'static,
{
    pub fn new(ctx: RunContext, snmp: Arc<S>, telnet: T) -> Self {
        Self {
            ctx,
            snmp,
            telnet,
            normalizer: Normalizer::new().sentinel(EPON_NO_SIGNAL),
        }
    }

    /// Walk the ONU table, keyed by interface.
    async fn read_levels(&self, olt: &Olt) -> Result<BTreeMap<String, OnuLevels>, PollError> {
        let mut transport = self
            .snmp
            .open(&olt.address, &olt.community, SnmpVersion::V2c)
            .await?;

        let outcome = Walker::new(ONU_NAME.clone())
            .column(ONU_MAC.clone())
            .column(ONU_TX.clone())
            .column(PON_RX.clone())
            .column(PON_RX_ALT.clone())
            .max_rows(self.ctx.settings.snmp.max_walk_rows)
            .run(transport.as_mut())
            .await;

        match outcome.stop {
            WalkStop::Error(e) if outcome.rows.is_empty() => return Err(e.into()),
            ref stop if !stop.is_clean() => {
                tracing::warn!(
                    olt = %olt.name,
                    rows = outcome.rows.len(),
                    stop = ?stop,
                    "ONU walk cut short"
                );
            }
            _ => {}
        }

        Ok(outcome
            .rows
            .iter()
            .filter_map(|row| OnuLevels::from_row(row, &self.normalizer))
            .map(|onu| (onu.interface.clone(), onu))
            .collect())
    }

    fn record_levels(&self, olt: &Olt, onu: &OnuLevels, summary: &mut PollSummary) {
        if onu.mac.is_empty() {
            summary.dropped += 1;
            tracing::warn!(olt = %olt.name, interface = %onu.interface, "ONU without MAC");
            return;
        }
        let values = [
            onu.tx.and_then(|v| self.normalizer.normalize_exact(v, LEVEL_RATE)),
            onu.rx.and_then(|v| self.normalizer.normalize_exact(v, LEVEL_RATE)),
        ];
        if values.iter().all(Option::is_none) {
            summary.dropped += 1;
            tracing::debug!(olt = %olt.name, interface = %onu.interface, "ONU without levels");
            return;
        }

        let path = self.ctx.sink.file_path(&olt.id.to_string(), &onu.file_name());
        record_point(&self.ctx, &path, &level_config(), &values, summary);
    }

    /// Log in, list active ONUs and upsert one status row per ONU the
    /// walk also returned.
    async fn scrape_status(
        &self,
        olt: &Olt,
        levels: &BTreeMap<String, OnuLevels>,
        summary: &mut PollSummary,
    ) -> Result<(), PollError> {
        let telnet = &self.ctx.settings.telnet;
        let options = SessionOptions {
            step_timeout: telnet.timeout,
            reconnect_attempts: telnet.reconnect_attempts,
            ..Default::default()
        };
        let address = format!("{}:{}", olt.address, telnet.port);

        let session = TelnetSession::new(self.telnet.clone(), address, options)
            .connect()
            .await
            .authenticate(login_script(olt))
            .await;
        if let Some(e) = chain_error(&session, "login") {
            session.close();
            return Err(e);
        }

        let mut session = session.execute(&command("show epon active-onu")).await;
        if let Some(e) = chain_error(&session, "show epon active-onu") {
            session.close();
            return Err(e);
        }
        let active = session.extract(&ActiveOnuGrammar);
        tracing::debug!(olt = %olt.name, active = active.len(), "Active ONUs listed");

        for onu in active {
            let Some(level) = levels.get(&onu.interface) else {
                tracing::debug!(
                    olt = %olt.name,
                    interface = %onu.interface,
                    "Active ONU missing from walk"
                );
                continue;
            };

            let show = format!("show mac address-table dynamic interface {}", onu.interface);
            session = session.reset().execute(&command(show.as_str())).await;
            if let Some(e) = chain_error(&session, &show) {
                summary.dropped += 1;
                tracing::error!(
                    olt = %olt.name,
                    interface = %onu.interface,
                    error = %e,
                    "MAC table read failed"
                );
                continue;
            }

            let macs = session
                .extract(&MacTableGrammar)
                .into_iter()
                .filter(|mac| *mac != level.mac)
                .collect::<Vec<_>>()
                .join(",");
            if macs.len() > MACS_WARN_LEN {
                tracing::warn!(
                    olt = %olt.name,
                    interface = %onu.interface,
                    len = macs.len(),
                    "MAC list exceeds column width"
                );
            }

            self.ctx
                .mutations
                .queue(
                    UPSERT_ONU,
                    vec![
                        SqlArg::Int(olt.id),
                        onu.interface.clone().into(),
                        level.mac.clone().into(),
                        level.tx.into(),
                        level.rx.into(),
                        onu.distance.into(),
                        onu.rtt.into(),
                        onu.dereg_reason.clone().into(),
                        (!macs.is_empty()).then_some(macs).into(),
                    ],
                )
                .await?;
            summary.mutations += 1;
        }

        session.close();
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S, T> DevicePoller for EponPoller<S, T>
where
    S: SnmpConnector,
    T: Connector + Clone + 'static,
{
    type Device = Olt;

    fn name(&self) -> &str {
        "epon"
    }

    fn describe(&self, olt: &Olt) -> String {
        format!("{} ({})", olt.name, olt.address)
    }

    async fn poll(&self, olt: Olt) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();

        let levels = self.read_levels(&olt).await?;
        for onu in levels.values() {
            self.record_levels(&olt, onu, &mut summary);
        }
        tracing::debug!(olt = %olt.name, onus = levels.len(), "ONU levels stored");

        self.scrape_status(&olt, &levels, &mut summary).await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::config::AppConfig;
    use crate::poller::testing::{FakeSnmp, ScriptedAgent, ScriptedTelnet, TestBed};

    const NAME: &str = ".1.3.6.1.4.1.3320.9.64.4.1.1.2";
    const MAC: &str = ".1.3.6.1.4.1.3320.101.10.1.1.3";
    const TX: &str = ".1.3.6.1.4.1.3320.101.10.5.1.5";
    const RX: &str = ".1.3.6.1.4.1.3320.9.183.1.1.5";
    const RX_ALT: &str = ".1.3.6.1.4.1.3320.101.108.1.3";

    const ACTIVE: &str = "show epon active-onu\r\n\
        Interface  MAC Address     Status          OAM Status   Distance RTT \
        LastRegTime          LastDeregTime        LastDeregReason AliveTime\r\n\
        EPON0/1:1  fcfa.f701.2a3c  auto_configured ctc-oam-oper 1520     41   \
        2026.03.01.08:12:40  2026.03.01.08:10:02 power-off       0.03:47:20\r\n\
        EPON0/1:2  fcfa.f701.2a3d  auto_configured ctc-oam-oper 980      27   \
        2026.02.27.11:00:00  2026.02.27.10:58:31 wire-down       2.01:00:00\r\n\
        EPON0/1:3  fcfa.f701.2a3e  auto_configured ctc-oam-oper 400      12   \
        2026.02.20.11:00:00  2026.02.20.10:58:31 unknow          9.01:00:00\r\n\
        olt-7#";

    const MACS_1: &str = "show mac address-table dynamic interface EPON0/1:1\r\n\
        Vlan  Mac Address     Type     Ports\r\n\
        1     fcfa.f701.2a3c  DYNAMIC  epon0/1:1\r\n\
        1     001a.2b3c.4d5e  DYNAMIC  epon0/1:1\r\n\
        1     001a.2b3c.4d5f  DYNAMIC  epon0/1:1\r\n\
        olt-7#";

    const MACS_2: &str = "show mac address-table dynamic interface EPON0/1:2\r\n\
        Vlan  Mac Address     Type     Ports\r\n\
        olt-7#";

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn olt() -> Olt {
        Olt {
            id: 7,
            name: "olt-7".into(),
            address: "10.9.0.7".into(),
            community: "epon-ro".into(),
            username: "admin".into(),
            password: "secret".into(),
        }
    }

    fn settings() -> AppConfig {
        let mut settings = AppConfig::default();
        settings.telnet.timeout = Duration::from_millis(500);
        settings.telnet.reconnect_attempts = 0;
        settings
    }

    fn agent() -> ScriptedAgent {
        let at = |column: &str, index: u32| format!("{column}.{index}");
        let entries = vec![
            (at(NAME, 10), SnmpValue::OctetString(b"epon0/1:1".to_vec())),
            (at(NAME, 11), SnmpValue::OctetString(b"EPON0/1:2".to_vec())),
            (at(NAME, 12), SnmpValue::OctetString(b"EPON0/1".to_vec())),
            (at(MAC, 10), SnmpValue::OctetString(vec![0xfc, 0xfa, 0xf7, 0x01, 0x2a, 0x3c])),
            (at(MAC, 11), SnmpValue::OctetString(vec![0xfc, 0xfa, 0xf7, 0x01, 0x2a, 0x3d])),
            (at(TX, 10), SnmpValue::Integer(-65535)),
            (at(TX, 11), SnmpValue::Integer(-234)),
            (at(RX, 10), SnmpValue::Integer(-215)),
            (at(RX, 11), SnmpValue::Integer(1)),
            (at(RX_ALT, 11), SnmpValue::Integer(-187)),
        ];
        let borrowed: Vec<(&str, SnmpValue)> =
            entries.iter().map(|(o, v)| (o.as_str(), v.clone())).collect();
        ScriptedAgent::new(&borrowed)
    }

    fn cli() -> ScriptedTelnet {
        ScriptedTelnet::new("\r\nUser Access Verification\r\n\r\nUsername: ")
            .reply("admin", "admin\r\nPassword: ")
            .reply("secret", "\r\nolt-7>")
            .reply("enable", "enable\r\nPassword:")
            .reply("secret", "\r\nolt-7#")
            .reply("show epon active-onu", ACTIVE)
            .reply("show mac address-table dynamic interface EPON0/1:1", MACS_1)
            .reply("show mac address-table dynamic interface EPON0/1:2", MACS_2)
    }

    #[test]
    fn test_levels_from_row() {
        let normalizer = Normalizer::new().sentinel(EPON_NO_SIGNAL);
        let row = WalkRow {
            index: vec![10],
            values: vec![
                SnmpValue::OctetString(b"epon0/2:14".to_vec()),
                SnmpValue::OctetString(vec![0, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]),
                SnmpValue::Integer(-65535),
                SnmpValue::Integer(-201),
                SnmpValue::NoSuchInstance,
            ],
        };
        let onu = OnuLevels::from_row(&row, &normalizer).unwrap();
        assert_eq!(onu.interface, "EPON0/2:14");
        assert_eq!(onu.mac, "00:1A:2B:3C:4D:5E");
        assert_eq!(onu.file_name(), "001a2b3c4d5e");
        assert_eq!(onu.tx, None);
        assert_eq!(onu.rx, Some(Decimal::from(-201)));

        let port = WalkRow {
            index: vec![11],
            values: vec![SnmpValue::OctetString(b"EPON0/2".to_vec())],
        };
        assert_eq!(OnuLevels::from_row(&port, &normalizer), None);
    }

    #[tokio::test]
    async fn test_levels_and_status() {
        let bed = TestBed::with_settings(&[], settings());
        let snmp = FakeSnmp::default().agent("10.9.0.7", agent());
        let telnet = cli();
        let poller = EponPoller::new(bed.ctx.clone(), Arc::new(snmp), telnet.clone());

        let summary = poller.poll(olt()).await.unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.mutations, 2);
        assert_eq!(telnet.connects.load(Ordering::SeqCst), 1);

        // tx is the no-signal marker: only the PON level is kept
        let first = bed.ts_path("7/fcfaf7012a3c");
        assert_eq!(bed.ts.updates(&first), vec![vec![None, Some(d("-21.5"))]]);
        let second = bed.ts_path("7/fcfaf7012a3d");
        assert_eq!(
            bed.ts.updates(&second),
            vec![vec![Some(d("-23.4")), Some(d("-18.7"))]]
        );
        let config = bed.ts.config(&second).unwrap();
        assert_eq!(config.step, 300);
        assert_eq!(config.data_sources[0].name, "onu");
        assert_eq!(config.data_sources[1].name, "pon");
        assert_eq!(config.data_sources[1].min, Some(-50.0));
        assert_eq!(config.data_sources[1].max, Some(0.0));

        drop(poller);
        let (reader, _, report) = bed.finish();
        assert_eq!(report.applied, 2);

        let rows = reader
            .select_rows(
                "SELECT interface, mac, tx, rx, distance, rtt, dereg_reason, macs \
                 FROM onu_status WHERE epon_id = 7 ORDER BY interface",
                &[],
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["interface"], "EPON0/1:1");
        assert_eq!(rows[0]["mac"], "FC:FA:F7:01:2A:3C");
        assert!(!rows[0].contains_key("tx"));
        assert_eq!(rows[0]["rx"], "-215");
        assert_eq!(rows[0]["distance"], "1520");
        assert_eq!(rows[0]["rtt"], "41");
        assert_eq!(rows[0]["dereg_reason"], "power-off");
        assert_eq!(rows[0]["macs"], "00:1A:2B:3C:4D:5E,00:1A:2B:3C:4D:5F");

        assert_eq!(rows[1]["tx"], "-234");
        assert_eq!(rows[1]["rx"], "-187");
        assert_eq!(rows[1]["dereg_reason"], "wire-down");
        assert!(!rows[1].contains_key("macs"));
    }

    #[tokio::test]
    async fn test_reset_during_login_aborts_olt() {
        let bed = TestBed::with_settings(&[], settings());
        let snmp = FakeSnmp::default().agent("10.9.0.7", agent());
        let telnet = cli().reset_on_write(3);
        let poller = EponPoller::new(bed.ctx.clone(), Arc::new(snmp), telnet.clone());

        let err = poller.poll(olt()).await.unwrap_err();
        assert!(matches!(err, PollError::Protocol(_)), "{err}");
        // username, password, enable; nothing after the reset
        assert_eq!(telnet.writes.load(Ordering::SeqCst), 3);
        assert_eq!(telnet.connects.load(Ordering::SeqCst), 1);

        drop(poller);
        let (_, _, report) = bed.finish();
        assert_eq!(report.applied, 0);
    }

    #[tokio::test]
    async fn test_unreachable_olt_skips_telnet() {
        let bed = TestBed::with_settings(&[], settings());
        let snmp = FakeSnmp::default().agent("10.9.0.7", ScriptedAgent::silent());
        let telnet = cli();
        let poller = EponPoller::new(bed.ctx.clone(), Arc::new(snmp), telnet.clone());

        let err = poller.poll(olt()).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(telnet.connects.load(Ordering::SeqCst), 0);
        assert!(bed.ts.paths().is_empty());

        drop(poller);
        bed.finish();
    }

    #[tokio::test]
    async fn test_load_olts_filters() {
        let bed = TestBed::new(&[
            "INSERT INTO epon (id, name, ip, community, username, password, country) VALUES \
             (0, 'template', '10.0.0.1', 'c', 'u', 'p', 'ge'), \
             (3, 'olt-3', '10.9.0.3', 'c', 'u', 'p', 'ge'), \
             (4, 'fake-lab', '10.9.0.4', 'c', 'u', 'p', 'ge'), \
             (5, 'olt-5', '10.9.0.5', 'c', 'u', 'p', 'am'), \
             (6, 'olt-6', '10.9.0.6', 'c', 'u', 'p', 'ge')",
        ]);

        let all = load_olts(&bed.reader, "ge", None).unwrap();
        let ids: Vec<i64> = all.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![3, 6]);
        assert_eq!(all[0].address, "10.9.0.3");

        let one = load_olts(&bed.reader, "ge", Some("olt-6")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].name, "olt-6");
        assert!(!format!("{:?}", one[0]).contains("password: "));

        bed.finish();
    }
}
