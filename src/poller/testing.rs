//! Fakes shared by the job tests.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use tempfile::TempDir;

use crate::config::AppConfig;
use crate::context::RunContext;
use crate::inventory::TemplateCache;
use crate::poller::SnmpConnector;
use crate::snmp::{ObjectId, SnmpError, SnmpTransport, SnmpValue, SnmpVersion, VarBind};
use crate::storage::{
    DrainReport, DuckStore, MutationQueue, RelationalStore, RowReader, TimeSeriesError,
    TimeSeriesSink, TimeSeriesStore, TsConfig,
};
use crate::telnet::{Connector, Transport};

pub(crate) fn oid(s: &str) -> ObjectId {
    s.parse().unwrap()
}

pub(crate) fn poll_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

// =============================================================================
// SNMP
// =============================================================================

/// Agent answering from an ordered table.
#[derive(Clone, Default)]
pub(crate) struct ScriptedAgent {
    table: BTreeMap<ObjectId, SnmpValue>,
    fail: bool,
}

impl ScriptedAgent {
    pub fn new(entries: &[(&str, SnmpValue)]) -> Self {
        Self {
            table: entries.iter().map(|(o, v)| (oid(o), v.clone())).collect(),
            fail: false,
        }
    }

    pub fn silent() -> Self {
        Self {
            table: BTreeMap::new(),
            fail: true,
        }
    }
}

#[async_trait::async_trait]
impl SnmpTransport for ScriptedAgent {
    async fn get(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError> {
        if self.fail {
            return Err(SnmpError::Timeout { attempts: 2 });
        }
        Ok(oids
            .iter()
            .map(|o| {
                let value = self
                    .table
                    .get(o)
                    .cloned()
                    .unwrap_or(SnmpValue::NoSuchInstance);
                VarBind::new(o.clone(), value)
            })
            .collect())
    }

    async fn get_next(&mut self, oids: &[ObjectId]) -> Result<Vec<VarBind>, SnmpError> {
        use std::ops::Bound::{Excluded, Unbounded};

        if self.fail {
            return Err(SnmpError::Timeout { attempts: 2 });
        }
        Ok(oids
            .iter()
            .map(|o| match self.table.range((Excluded(o), Unbounded)).next() {
                Some((next, value)) => VarBind::new(next.clone(), value.clone()),
                None => VarBind::new(o.clone(), SnmpValue::EndOfMibView),
            })
            .collect())
    }
}

/// Connector handing out agents by host; unknown hosts refuse.
#[derive(Default)]
pub(crate) struct FakeSnmp {
    agents: HashMap<String, ScriptedAgent>,
    pub opened: Mutex<Vec<(String, String, SnmpVersion)>>,
}

impl FakeSnmp {
    pub fn agent(mut self, host: &str, agent: ScriptedAgent) -> Self {
        self.agents.insert(host.to_string(), agent);
        self
    }
}

#[async_trait::async_trait]
impl SnmpConnector for FakeSnmp {
    async fn open(
        &self,
        host: &str,
        community: &str,
        version: SnmpVersion,
    ) -> Result<Box<dyn SnmpTransport>, SnmpError> {
        self.opened
            .lock()
            .unwrap()
            .push((host.to_string(), community.to_string(), version));
        match self.agents.get(host) {
            Some(agent) => Ok(Box::new(agent.clone())),
            None => Err(SnmpError::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))),
        }
    }
}

// =============================================================================
// Telnet
// =============================================================================

/// Device CLI answering each written line with the first unused reply
/// whose prefix matches. Every connection starts with the full reply list;
/// clones share counters.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTelnet {
    banner: String,
    replies: Vec<(String, String)>,
    /// Writes from this one on fail with a connection reset.
    reset_on_write: Option<usize>,
    pub writes: Arc<AtomicUsize>,
    pub connects: Arc<AtomicUsize>,
}

impl ScriptedTelnet {
    pub fn new(banner: &str) -> Self {
        Self {
            banner: banner.to_string(),
            ..Default::default()
        }
    }

    pub fn reply(mut self, prefix: &str, text: &str) -> Self {
        self.replies.push((prefix.to_string(), text.to_string()));
        self
    }

    pub fn reset_on_write(mut self, n: usize) -> Self {
        self.reset_on_write = Some(n);
        self
    }
}

pub(crate) struct ScriptedLine {
    outbox: Vec<u8>,
    replies: Vec<(String, String)>,
    device: ScriptedTelnet,
}

#[async_trait::async_trait]
impl Transport for ScriptedLine {
    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.outbox.is_empty() {
            std::future::pending::<()>().await;
        }
        let n = buf.len().min(self.outbox.len());
        buf[..n].copy_from_slice(&self.outbox[..n]);
        self.outbox.drain(..n);
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        let n = self.device.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.device.reset_on_write.is_some_and(|limit| n >= limit) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ));
        }
        let line = String::from_utf8_lossy(data);
        let line = line.trim_end();
        if let Some(pos) = self
            .replies
            .iter()
            .position(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            let (_, reply) = self.replies.remove(pos);
            self.outbox.extend_from_slice(reply.as_bytes());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connector for ScriptedTelnet {
    type Transport = ScriptedLine;

    async fn connect(&self, _address: &str) -> std::io::Result<ScriptedLine> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedLine {
            outbox: self.banner.as_bytes().to_vec(),
            replies: self.replies.clone(),
            device: self.clone(),
        })
    }
}

// =============================================================================
// Time series
// =============================================================================

/// In-memory store recording every update per path.
#[derive(Default)]
pub(crate) struct MemoryTs {
    files: Mutex<HashMap<PathBuf, Vec<Vec<Option<Decimal>>>>>,
    configs: Mutex<HashMap<PathBuf, TsConfig>>,
    pub creates: AtomicUsize,
}

impl MemoryTs {
    pub fn updates(&self, path: &Path) -> Vec<Vec<Option<Decimal>>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    pub fn config(&self, path: &Path) -> Option<TsConfig> {
        self.configs.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

impl TimeSeriesStore for MemoryTs {
    fn create(&self, path: &Path, config: &TsConfig) -> Result<(), TimeSeriesError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return Err(TimeSeriesError::AlreadyExists(path.to_path_buf()));
        }
        files.insert(path.to_path_buf(), Vec::new());
        self.configs
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), config.clone());
        Ok(())
    }

    fn update(
        &self,
        path: &Path,
        _at: DateTime<Utc>,
        values: &[Option<Decimal>],
    ) -> Result<(), TimeSeriesError> {
        match self.files.lock().unwrap().get_mut(path) {
            Some(updates) => {
                updates.push(values.to_vec());
                Ok(())
            }
            None => Err(TimeSeriesError::NotFound(path.to_path_buf())),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

/// In-memory database, memory time-series store and a live mutation queue.
pub(crate) struct TestBed {
    pub ctx: RunContext,
    pub ts: Arc<MemoryTs>,
    pub reader: RowReader,
    queue: MutationQueue,
    _dir: TempDir,
}

impl TestBed {
    pub fn new(seed: &[&str]) -> Self {
        Self::with_settings(seed, AppConfig::default())
    }

    pub fn with_settings(seed: &[&str], settings: AppConfig) -> Self {
        let mut store = DuckStore::open_in_memory().unwrap();
        for sql in seed {
            store.execute(sql, &[]).unwrap();
        }
        let reader = store.reader().unwrap();
        let queue = MutationQueue::spawn(store, 64).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let ts = Arc::new(MemoryTs::default());
        let sink = TimeSeriesSink::new(ts.clone(), dir.path());
        let ctx = RunContext::new(
            poll_time(),
            sink,
            queue.sender(),
            Arc::new(reader.clone()),
            Arc::new(settings),
        );

        Self {
            ctx,
            ts,
            reader,
            queue,
            _dir: dir,
        }
    }

    pub fn templates(mut self, cache: TemplateCache) -> Self {
        self.ctx = self.ctx.with_templates(cache);
        self
    }

    pub fn ts_path(&self, rel: &str) -> PathBuf {
        self.ctx.sink.base_dir().join(rel)
    }

    /// Close the queue. Every poller holding a context clone must be
    /// dropped first.
    pub fn finish(self) -> (RowReader, Arc<MemoryTs>, DrainReport) {
        let Self {
            ctx,
            ts,
            reader,
            queue,
            _dir,
        } = self;
        drop(ctx);
        let report = queue.close().unwrap();
        (reader, ts, report)
    }
}
