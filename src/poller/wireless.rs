//! Wireless link quality from RouterOS registration tables.
//!
//! Each access-point interface is asked for its registration table. A
//! registered client whose radio name belongs to a known interface becomes
//! one `mt_links` row carrying both directions; any other client may be
//! recorded as a new board.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::context::RunContext;
use crate::inventory::{int_field, parse_rows, text_field};
use crate::poller::{DevicePoller, PollError, PollSummary};
use crate::routeros::{ApiConnector, Record};
use crate::storage::{Row, RowSource, SqlArg, StorageError};

const RADIO_IFACES_SQL: &str = "SELECT d.id AS device_id, d.ip, d.username, d.password, \
     i.id AS iface_id, i.name AS if_name, i.radio_name, i.mode \
     FROM devices d JOIN mt_ifaces i ON i.device_id = d.id ORDER BY i.id";

const REGISTRATION_PRINT: &str = "/interface/wireless/registration-table/print";

const UPSERT_LINK: &str = "INSERT INTO mt_links \
     (mt_iface1_id, mt_iface2_id, s1, s1_ch0, s1_ch1, ccq1, rate1, prev_byte1, \
      s2, s2_ch0, s2_ch1, ccq2, rate2, prev_byte2) \
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
     ON CONFLICT (mt_iface1_id, mt_iface2_id) DO UPDATE SET \
     s1 = EXCLUDED.s1, s1_ch0 = EXCLUDED.s1_ch0, s1_ch1 = EXCLUDED.s1_ch1, \
     ccq1 = EXCLUDED.ccq1, rate1 = EXCLUDED.rate1, \
     diff_byte1 = CASE WHEN EXCLUDED.prev_byte1 > prev_byte1 \
         THEN EXCLUDED.prev_byte1 - prev_byte1 ELSE 0 END, \
     prev_byte1 = EXCLUDED.prev_byte1, \
     s2 = EXCLUDED.s2, s2_ch0 = EXCLUDED.s2_ch0, s2_ch1 = EXCLUDED.s2_ch1, \
     ccq2 = EXCLUDED.ccq2, rate2 = EXCLUDED.rate2, \
     diff_byte2 = CASE WHEN EXCLUDED.prev_byte2 > prev_byte2 \
         THEN EXCLUDED.prev_byte2 - prev_byte2 ELSE 0 END, \
     prev_byte2 = EXCLUDED.prev_byte2, \
     updated_at = now()";

const UPSERT_BOARD: &str = "INSERT INTO mt_new_boards (name, last_ip) VALUES (?, ?) \
     ON CONFLICT (name) DO UPDATE SET last_ip = EXCLUDED.last_ip, updated_at = now()";

/// Fields a registration entry must carry to describe a link.
const LINK_FIELDS: [&str; 11] = [
    "tx-rate",
    "rx-rate",
    "bytes",
    "tx-signal-strength",
    "tx-signal-strength-ch0",
    "tx-signal-strength-ch1",
    "tx-ccq",
    "signal-strength",
    "signal-strength-ch0",
    "signal-strength-ch1",
    "rx-ccq",
];

static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").expect("leading number regex"));
static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("trailing number regex"));
static SIGNAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-\d+)").expect("signal regex"));

// =============================================================================
// Inventory
// =============================================================================

/// A wireless interface of a RouterOS board, with the board's API
/// credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct RadioIface {
    pub device_id: i64,
    pub address: String,
    pub username: String,
    pub password: String,
    pub iface_id: i64,
    pub if_name: String,
    pub radio_name: String,
    pub mode: String,
}

impl RadioIface {
    pub fn from_row(row: &Row) -> Result<Self, StorageError> {
        Ok(Self {
            device_id: int_field(row, "device_id")?,
            address: text_field(row, "ip")?,
            username: row.get("username").cloned().unwrap_or_default(),
            password: row.get("password").cloned().unwrap_or_default(),
            iface_id: int_field(row, "iface_id")?,
            if_name: text_field(row, "if_name")?,
            radio_name: text_field(row, "radio_name")?,
            mode: text_field(row, "mode")?,
        })
    }

    /// Only access points hold a registration table worth reading.
    pub fn is_access_point(&self) -> bool {
        matches!(self.mode.as_str(), "ap-bridge" | "bridge")
    }
}

impl std::fmt::Debug for RadioIface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioIface")
            .field("iface_id", &self.iface_id)
            .field("address", &self.address)
            .field("if_name", &self.if_name)
            .field("radio_name", &self.radio_name)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

pub fn load_radio_ifaces(source: &dyn RowSource) -> Result<Vec<RadioIface>, StorageError> {
    let ifaces = parse_rows(
        source.select_rows(RADIO_IFACES_SQL, &[])?,
        "radio interface",
        RadioIface::from_row,
    );
    tracing::info!(count = ifaces.len(), "Radio interfaces loaded");
    Ok(ifaces)
}

/// Known wireless interfaces keyed by radio name. On duplicate names the
/// last interface wins.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    by_radio: HashMap<String, RadioIface>,
}

impl LinkRegistry {
    pub fn new(ifaces: impl IntoIterator<Item = RadioIface>) -> Self {
        Self {
            by_radio: ifaces
                .into_iter()
                .map(|iface| (iface.radio_name.clone(), iface))
                .collect(),
        }
    }

    pub fn lookup(&self, radio_name: &str) -> Option<&RadioIface> {
        self.by_radio.get(radio_name)
    }

    /// Interfaces to poll, by interface id.
    pub fn access_points(&self) -> Vec<RadioIface> {
        let mut aps: Vec<RadioIface> = self
            .by_radio
            .values()
            .filter(|iface| iface.is_access_point())
            .cloned()
            .collect();
        aps.sort_by_key(|iface| iface.iface_id);
        aps
    }

    pub fn len(&self) -> usize {
        self.by_radio.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_radio.is_empty()
    }
}

// =============================================================================
// Registration entries
// =============================================================================

/// One registration entry, as seen from the access point: side 1 is what
/// the AP transmits, side 2 what it receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct LinkSample {
    tx_signal: Option<i64>,
    tx_signal_ch0: Option<i64>,
    tx_signal_ch1: Option<i64>,
    tx_ccq: Option<i64>,
    tx_rate: Option<i64>,
    tx_bytes: Option<i64>,
    rx_signal: Option<i64>,
    rx_signal_ch0: Option<i64>,
    rx_signal_ch1: Option<i64>,
    rx_ccq: Option<i64>,
    rx_rate: Option<i64>,
    rx_bytes: Option<i64>,
}

impl LinkSample {
    /// Parse an entry; `Err` names the first missing field. Values that
    /// are present but unreadable become NULL.
    fn from_record(record: &Record) -> Result<Self, &'static str> {
        if let Some(missing) = LINK_FIELDS.into_iter().find(|f| !record.contains_key(*f)) {
            return Err(missing);
        }
        Ok(Self {
            tx_signal: number(&SIGNAL, record, "tx-signal-strength"),
            tx_signal_ch0: number(&SIGNAL, record, "tx-signal-strength-ch0"),
            tx_signal_ch1: number(&SIGNAL, record, "tx-signal-strength-ch1"),
            tx_ccq: field(record, "tx-ccq").trim().parse().ok(),
            tx_rate: number(&LEADING_NUMBER, record, "tx-rate"),
            tx_bytes: number(&LEADING_NUMBER, record, "bytes"),
            rx_signal: number(&SIGNAL, record, "signal-strength"),
            rx_signal_ch0: number(&SIGNAL, record, "signal-strength-ch0"),
            rx_signal_ch1: number(&SIGNAL, record, "signal-strength-ch1"),
            rx_ccq: field(record, "rx-ccq").trim().parse().ok(),
            rx_rate: number(&LEADING_NUMBER, record, "rx-rate"),
            rx_bytes: number(&TRAILING_NUMBER, record, "bytes"),
        })
    }

    fn args(&self, local: i64, remote: i64) -> Vec<SqlArg> {
        vec![
            SqlArg::Int(local),
            SqlArg::Int(remote),
            self.tx_signal.into(),
            self.tx_signal_ch0.into(),
            self.tx_signal_ch1.into(),
            self.tx_ccq.into(),
            self.tx_rate.into(),
            self.tx_bytes.into(),
            self.rx_signal.into(),
            self.rx_signal_ch0.into(),
            self.rx_signal_ch1.into(),
            self.rx_ccq.into(),
            self.rx_rate.into(),
            self.rx_bytes.into(),
        ]
    }
}

fn field<'a>(record: &'a Record, name: &str) -> &'a str {
    record.get(name).map(String::as_str).unwrap_or_default()
}

/// First capture of `re` in field `name` as an integer.
fn number(re: &Regex, record: &Record, name: &str) -> Option<i64> {
    re.captures(field(record, name))
        .and_then(|c| c[1].parse().ok())
}

// =============================================================================
// Poller
// =============================================================================

pub struct WirelessPoller<A> {
    ctx: RunContext,
    api: Arc<A>,
    registry: Arc<LinkRegistry>,
}

impl<A: ApiConnector + 'static> WirelessPoller<A> {
    pub fn new(ctx: RunContext, api: Arc<A>, registry: Arc<LinkRegistry>) -> Self {
        Self { ctx, api, registry }
    }

    async fn register_board(
        &self,
        ap: &RadioIface,
        record: &Record,
        summary: &mut PollSummary,
    ) -> Result<(), PollError> {
        if !self.ctx.settings.routeros.register_new_boards {
            return Ok(());
        }
        let (Some(name), Some(last_ip)) = (record.get("radio-name"), record.get("last-ip")) else {
            summary.dropped += 1;
            tracing::info!(ap = %ap.radio_name, "Unknown client without radio-name or last-ip");
            return Ok(());
        };

        self.ctx
            .mutations
            .queue(UPSERT_BOARD, vec![name.clone().into(), last_ip.clone().into()])
            .await?;
        summary.mutations += 1;
        tracing::debug!(ap = %ap.radio_name, board = %name, %last_ip, "New board recorded");
        Ok(())
    }
}

#[async_trait::async_trait]
impl<A: ApiConnector + 'static> DevicePoller for WirelessPoller<A> {
    type Device = RadioIface;

    fn name(&self) -> &str {
        "wireless-links"
    }

    fn describe(&self, ap: &RadioIface) -> String {
        format!("{} {} ({})", ap.radio_name, ap.if_name, ap.address)
    }

    async fn poll(&self, ap: RadioIface) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();

        let mut session = self
            .api
            .open(&ap.address, &ap.username, &ap.password)
            .await?;
        let filter = format!("?interface={}", ap.if_name);
        let entries = session.run(REGISTRATION_PRINT, &[filter.as_str()]).await?;
        tracing::debug!(ap = %ap.radio_name, entries = entries.len(), "Registration table read");

        for record in &entries {
            let peer = record
                .get("radio-name")
                .and_then(|name| self.registry.lookup(name));
            let Some(peer) = peer else {
                self.register_board(&ap, record, &mut summary).await?;
                continue;
            };

            let sample = match LinkSample::from_record(record) {
                Ok(sample) => sample,
                Err(field) => {
                    summary.dropped += 1;
                    tracing::info!(
                        ap = %ap.radio_name,
                        peer = %peer.radio_name,
                        field,
                        "Registration entry incomplete"
                    );
                    continue;
                }
            };

            self.ctx
                .mutations
                .queue(UPSERT_LINK, sample.args(ap.iface_id, peer.iface_id))
                .await?;
            summary.mutations += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::config::AppConfig;
    use crate::poller::testing::TestBed;
    use crate::routeros::{ApiError, ApiSession};

    /// Device answering each print with the next queued table.
    struct FakeBoard {
        tables: Arc<Mutex<VecDeque<Vec<Record>>>>,
        commands: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    #[async_trait::async_trait]
    impl ApiSession for FakeBoard {
        async fn run(&mut self, command: &str, args: &[&str]) -> Result<Vec<Record>, ApiError> {
            self.commands.lock().unwrap().push((
                command.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            ));
            self.tables
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ApiError::Trap("no such command".into()))
        }
    }

    #[derive(Default)]
    struct FakeApi {
        boards: HashMap<String, Arc<Mutex<VecDeque<Vec<Record>>>>>,
        commands: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl FakeApi {
        fn board(mut self, host: &str, tables: Vec<Vec<Record>>) -> Self {
            self.boards
                .insert(host.to_string(), Arc::new(Mutex::new(tables.into())));
            self
        }
    }

    #[async_trait::async_trait]
    impl ApiConnector for FakeApi {
        async fn open(
            &self,
            host: &str,
            _username: &str,
            password: &str,
        ) -> Result<Box<dyn ApiSession>, ApiError> {
            let Some(tables) = self.boards.get(host) else {
                return Err(ApiError::Connect(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            };
            if password != "mt-pass" {
                return Err(ApiError::Login("invalid user name or password".into()));
            }
            Ok(Box::new(FakeBoard {
                tables: Arc::clone(tables),
                commands: Arc::clone(&self.commands),
            }))
        }
    }

    fn iface(iface_id: i64, address: &str, radio_name: &str, mode: &str) -> RadioIface {
        RadioIface {
            device_id: iface_id / 10,
            address: address.to_string(),
            username: "api".into(),
            password: "mt-pass".into(),
            iface_id,
            if_name: "wlan1".into(),
            radio_name: radio_name.to_string(),
            mode: mode.to_string(),
        }
    }

    fn registry() -> Arc<LinkRegistry> {
        Arc::new(LinkRegistry::new([
            iface(10, "10.5.0.1", "tower-north", "ap-bridge"),
            iface(20, "10.5.0.2", "farm-7", "station"),
            iface(30, "10.5.0.3", "farm-9", "station-bridge"),
        ]))
    }

    fn entry(radio_name: &str, bytes: &str) -> Record {
        [
            ("radio-name", radio_name),
            ("tx-rate", "130Mbps-20MHz/2S/SGI"),
            ("rx-rate", "117Mbps-20MHz/2S"),
            ("bytes", bytes),
            ("tx-signal-strength", "-62"),
            ("tx-signal-strength-ch0", "-65"),
            ("tx-signal-strength-ch1", "-64"),
            ("tx-ccq", "87"),
            ("signal-strength", "-60@HT20-7"),
            ("signal-strength-ch0", "-63"),
            ("signal-strength-ch1", "-61"),
            ("rx-ccq", "91"),
            ("last-ip", "10.5.3.9"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_sample_parsing() {
        let sample = LinkSample::from_record(&entry("farm-7", "1843200,99120")).unwrap();
        assert_eq!(sample.tx_rate, Some(130));
        assert_eq!(sample.rx_rate, Some(117));
        assert_eq!(sample.tx_bytes, Some(1_843_200));
        assert_eq!(sample.rx_bytes, Some(99_120));
        assert_eq!(sample.rx_signal, Some(-60));
        assert_eq!(sample.tx_ccq, Some(87));

        let mut partial = entry("farm-7", "1,2");
        partial.remove("tx-ccq");
        assert_eq!(LinkSample::from_record(&partial), Err("tx-ccq"));

        let mut odd = entry("farm-7", "1,2");
        odd.insert("tx-signal-strength".into(), "n/a".into());
        assert_eq!(LinkSample::from_record(&odd).unwrap().tx_signal, None);
    }

    #[test]
    fn test_registry_access_points() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        let aps = registry.access_points();
        assert_eq!(aps.len(), 1);
        assert_eq!(aps[0].iface_id, 10);
        assert_eq!(registry.lookup("farm-9").unwrap().iface_id, 30);
        assert!(registry.lookup("unknown").is_none());
    }

    #[tokio::test]
    async fn test_link_upsert_tracks_byte_deltas() {
        let bed = TestBed::new(&[]);
        let api = FakeApi::default().board(
            "10.5.0.1",
            vec![
                vec![entry("farm-7", "1000,2000"), entry("farm-9", "50,60")],
                vec![entry("farm-7", "1500,1800")],
            ],
        );
        let commands = Arc::clone(&api.commands);
        let poller = WirelessPoller::new(bed.ctx.clone(), Arc::new(api), registry());
        let ap = registry().access_points().remove(0);

        assert_eq!(poller.poll(ap.clone()).await.unwrap().mutations, 2);
        assert_eq!(poller.poll(ap).await.unwrap().mutations, 1);
        assert_eq!(
            commands.lock().unwrap()[0],
            (
                REGISTRATION_PRINT.to_string(),
                vec!["?interface=wlan1".to_string()]
            )
        );

        drop(poller);
        let (reader, _, report) = bed.finish();
        assert_eq!(report.applied, 3);
        assert_eq!(report.failed, 0);

        let rows = reader
            .select_rows(
                "SELECT mt_iface2_id, s1, s2, ccq1, rate1, rate2, prev_byte1, diff_byte1, \
                 prev_byte2, diff_byte2 FROM mt_links WHERE mt_iface1_id = 10 \
                 ORDER BY mt_iface2_id",
                &[],
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["mt_iface2_id"], "20");
        assert_eq!(rows[0]["s1"], "-62");
        assert_eq!(rows[0]["s2"], "-60");
        assert_eq!(rows[0]["ccq1"], "87");
        assert_eq!(rows[0]["rate1"], "130");
        assert_eq!(rows[0]["rate2"], "117");
        assert_eq!(rows[0]["prev_byte1"], "1500");
        assert_eq!(rows[0]["diff_byte1"], "500");
        // counter went backwards: no delta
        assert_eq!(rows[0]["prev_byte2"], "1800");
        assert_eq!(rows[0]["diff_byte2"], "0");
        assert_eq!(rows[1]["diff_byte1"], "0");
    }

    #[tokio::test]
    async fn test_incomplete_and_unknown_entries() {
        let mut settings = AppConfig::default();
        settings.routeros.register_new_boards = true;
        let bed = TestBed::with_settings(&[], settings);

        let mut incomplete = entry("farm-9", "1,2");
        incomplete.remove("signal-strength-ch1");
        let mut anonymous = entry("ghost", "1,2");
        anonymous.remove("last-ip");
        let api = FakeApi::default().board(
            "10.5.0.1",
            vec![vec![
                incomplete,
                entry("new-roof", "1,2"),
                anonymous,
                entry("farm-7", "10,20"),
            ]],
        );
        let poller = WirelessPoller::new(bed.ctx.clone(), Arc::new(api), registry());

        let summary = poller
            .poll(registry().access_points().remove(0))
            .await
            .unwrap();
        assert_eq!(summary.mutations, 2);
        assert_eq!(summary.dropped, 2);

        drop(poller);
        let (reader, _, _) = bed.finish();
        let boards = reader
            .select_rows("SELECT name, last_ip FROM mt_new_boards", &[])
            .unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0]["name"], "new-roof");
        assert_eq!(boards[0]["last_ip"], "10.5.3.9");
    }

    #[tokio::test]
    async fn test_unknown_clients_ignored_by_default() {
        let bed = TestBed::new(&[]);
        let api = FakeApi::default().board("10.5.0.1", vec![vec![entry("new-roof", "1,2")]]);
        let poller = WirelessPoller::new(bed.ctx.clone(), Arc::new(api), registry());

        let summary = poller
            .poll(registry().access_points().remove(0))
            .await
            .unwrap();
        assert_eq!(summary, PollSummary::default());

        drop(poller);
        let (_, _, report) = bed.finish();
        assert_eq!(report.applied, 0);
    }

    #[tokio::test]
    async fn test_session_errors() {
        let bed = TestBed::new(&[]);
        let api = FakeApi::default().board("10.5.0.1", vec![]);
        let poller = WirelessPoller::new(bed.ctx.clone(), Arc::new(api), registry());

        let mut wrong = registry().access_points().remove(0);
        wrong.password = "nope".into();
        let err = poller.poll(wrong).await.unwrap_err();
        assert!(matches!(err, PollError::Protocol(_)), "{err}");

        let unreachable = iface(40, "10.5.0.40", "tower-south", "ap-bridge");
        assert!(poller.poll(unreachable).await.unwrap_err().is_connection());

        // the board answers the print with a trap
        let err = poller
            .poll(registry().access_points().remove(0))
            .await
            .unwrap_err();
        assert!(!err.is_connection());

        drop(poller);
        bed.finish();
    }

    #[tokio::test]
    async fn test_load_radio_ifaces() {
        let bed = TestBed::new(&[
            "INSERT INTO devices (id, name, device_type_id, ip, username, password) VALUES \
             (1, 'tower', 3, '10.5.0.1', 'api', 'mt-pass'), \
             (2, 'farm', 3, '10.5.0.2', NULL, NULL)",
            "INSERT INTO mt_ifaces (id, device_id, name, radio_name, mode) VALUES \
             (10, 1, 'wlan1', 'tower-north', 'ap-bridge'), \
             (20, 2, 'wlan1', 'farm-7', 'station')",
        ]);

        let ifaces = load_radio_ifaces(&bed.reader).unwrap();
        assert_eq!(ifaces.len(), 2);
        assert_eq!(ifaces[0].address, "10.5.0.1");
        assert_eq!(ifaces[0].password, "mt-pass");
        assert!(ifaces[0].is_access_point());
        assert_eq!(ifaces[1].username, "");
        assert!(!ifaces[1].is_access_point());

        bed.finish();
    }
}
