//! Time-series sink: create-or-update of round-robin files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::TimeSeriesError;

// =============================================================================
// Configuration
// =============================================================================

/// How a data source turns successive readings into a rate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum DataSourceKind {
    Gauge,
    Counter,
    Derive,
    Absolute,
}

/// Consolidation function of an archive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Consolidation {
    Average,
    Last,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceSpec {
    pub name: String,
    pub kind: DataSourceKind,
    /// Seconds without an update after which the value becomes unknown.
    pub heartbeat: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    pub consolidation: Consolidation,
    /// Largest unknown fraction of primary points still consolidated.
    pub xff: f64,
    pub steps: u32,
    pub rows: u32,
}

/// Steps per row of the retention schedule: daily, weekly, monthly, yearly.
const RETENTION_STEPS: [u32; 4] = [1, 7, 30, 365];

const RETENTION_ROWS: u32 = 288;

/// Layout of a new time-series file.
#[derive(Debug, Clone, PartialEq)]
pub struct TsConfig {
    /// Primary step in seconds.
    pub step: u64,
    pub data_sources: Vec<DataSourceSpec>,
    pub archives: Vec<ArchiveSpec>,
    /// Time of the (virtual) last update; defaults to ten seconds ago.
    pub start: Option<DateTime<Utc>>,
}

impl TsConfig {
    /// Empty layout with the default retention schedule.
    pub fn new(step: u64) -> Self {
        Self {
            step: step.max(1),
            data_sources: Vec::new(),
            archives: default_archives(),
            start: None,
        }
    }

    /// Add a data source with heartbeat of two steps.
    pub fn data_source(
        mut self,
        name: impl Into<String>,
        kind: DataSourceKind,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        self.data_sources.push(DataSourceSpec {
            name: name.into(),
            kind,
            heartbeat: self.step * 2,
            min,
            max,
        });
        self
    }

    pub fn start(mut self, at: DateTime<Utc>) -> Self {
        self.start = Some(at);
        self
    }
}

/// AVERAGE/LAST/MIN/MAX at 1, 7, 30 and 365 steps per row, 288 rows each.
pub fn default_archives() -> Vec<ArchiveSpec> {
    RETENTION_STEPS
        .iter()
        .flat_map(|&steps| {
            [
                Consolidation::Average,
                Consolidation::Last,
                Consolidation::Min,
                Consolidation::Max,
            ]
            .into_iter()
            .map(move |consolidation| ArchiveSpec {
                consolidation,
                xff: 0.5,
                steps,
                rows: RETENTION_ROWS,
            })
        })
        .collect()
}

// =============================================================================
// Store trait
// =============================================================================

/// Backend holding the round-robin files.
pub trait TimeSeriesStore: Send + Sync {
    /// Create a new file. Fails with `AlreadyExists` if one is present.
    fn create(&self, path: &Path, config: &TsConfig) -> Result<(), TimeSeriesError>;

    /// Record one reading per data source; `None` is unknown.
    fn update(
        &self,
        path: &Path,
        at: DateTime<Utc>,
        values: &[Option<Decimal>],
    ) -> Result<(), TimeSeriesError>;
}

// =============================================================================
// Sink
// =============================================================================

/// Outcome of [`TimeSeriesSink::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Updated,
    Created,
}

/// Maps samples to deterministic paths and runs create-or-update.
#[derive(Clone)]
pub struct TimeSeriesSink {
    store: Arc<dyn TimeSeriesStore>,
    base_dir: PathBuf,
}

impl TimeSeriesSink {
    pub fn new(store: Arc<dyn TimeSeriesStore>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `{base}/{template path}/{id padded to ten digits}`.
    pub fn path_for(&self, template_path: &str, id: impl std::fmt::Display) -> PathBuf {
        self.base_dir
            .join(template_path)
            .join(format!("{:0>10}", id.to_string()))
    }

    /// `{base}/{template path}/{file}`, for names chosen by a value query.
    pub fn file_path(&self, template_path: &str, file: &str) -> PathBuf {
        self.base_dir.join(template_path).join(file)
    }

    /// Update `path`; if the file is missing, create it and retry once.
    ///
    /// A create that loses a race with another writer is logged at debug
    /// and the retry still runs against the winner's file.
    pub fn store(
        &self,
        path: &Path,
        config: &TsConfig,
        at: DateTime<Utc>,
        values: &[Option<Decimal>],
    ) -> Result<StoreOutcome, TimeSeriesError> {
        match self.store.update(path, at, values) {
            Ok(()) => return Ok(StoreOutcome::Updated),
            Err(TimeSeriesError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let config = match config.start {
            Some(_) => config.clone(),
            None => config.clone().start(at - chrono::Duration::seconds(10)),
        };
        match self.store.create(path, &config) {
            Ok(()) => tracing::debug!(path = %path.display(), "Time-series file created"),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Time-series create failed")
            }
        }

        self.store.update(path, at, values)?;
        Ok(StoreOutcome::Created)
    }
}

impl std::fmt::Debug for TimeSeriesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSeriesSink")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}
