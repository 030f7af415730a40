//! File-backed round-robin store.
//!
//! Each path holds one JSON document: data source state, one ring buffer
//! per archive, and the time of the last update. Updates are written to a
//! temporary file and renamed into place; creates use a no-clobber persist
//! so two racing creators cannot both succeed.
//!
//! Primary data points are not time-weighted: every step boundary crossed
//! by an update receives the rate computed for that update.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::storage::TimeSeriesError;
use crate::storage::timeseries::{
    ArchiveSpec, Consolidation, DataSourceKind, DataSourceSpec, TimeSeriesStore, TsConfig,
};

const COUNTER32_WRAP: f64 = 4_294_967_296.0;
const COUNTER64_WRAP: f64 = 18_446_744_073_709_551_616.0;

/// Stores every file on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct RrdFileStore;

impl RrdFileStore {
    pub fn new() -> Self {
        Self
    }

    /// Load a file for inspection.
    pub fn read(&self, path: &Path) -> Result<RrdFile, TimeSeriesError> {
        let bytes = fs::read(path).map_err(|e| not_found(e, path))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_replace(&self, path: &Path, file: &RrdFile) -> Result<(), TimeSeriesError> {
        let tmp = self.write_temp(path, file)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_temp(&self, path: &Path, file: &RrdFile) -> Result<NamedTempFile, TimeSeriesError> {
        let dir = path
            .parent()
            .ok_or_else(|| TimeSeriesError::Invalid(format!("no parent: {}", path.display())))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| not_found(e, path))?;
        serde_json::to_writer(&mut tmp, file)?;
        tmp.flush()?;
        Ok(tmp)
    }
}

impl TimeSeriesStore for RrdFileStore {
    fn create(&self, path: &Path, config: &TsConfig) -> Result<(), TimeSeriesError> {
        if config.data_sources.is_empty() {
            return Err(TimeSeriesError::Invalid("no data sources".to_string()));
        }
        if config.archives.iter().any(|a| a.steps == 0 || a.rows == 0) {
            return Err(TimeSeriesError::Invalid("archive with zero steps or rows".to_string()));
        }

        let start = config
            .start
            .unwrap_or_else(|| Utc::now() - chrono::Duration::seconds(10));
        let file = RrdFile::new(config, start.timestamp());

        let tmp = self.write_temp(path, &file)?;
        tmp.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                TimeSeriesError::AlreadyExists(path.to_path_buf())
            } else {
                TimeSeriesError::Io(e.error)
            }
        })?;
        Ok(())
    }

    fn update(
        &self,
        path: &Path,
        at: DateTime<Utc>,
        values: &[Option<Decimal>],
    ) -> Result<(), TimeSeriesError> {
        let mut file = self.read(path)?;
        let readings: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.as_ref().and_then(Decimal::to_f64))
            .collect();
        file.apply(at.timestamp(), &readings)?;
        self.write_replace(path, &file)
    }
}

fn not_found(e: io::Error, path: &Path) -> TimeSeriesError {
    if e.kind() == io::ErrorKind::NotFound {
        TimeSeriesError::NotFound(path.to_path_buf())
    } else {
        TimeSeriesError::Io(e)
    }
}

// =============================================================================
// File format
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrdFile {
    pub step: u64,
    pub last_update: i64,
    pub sources: Vec<SourceState>,
    pub archives: Vec<ArchiveState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceState {
    pub spec: DataSourceSpec,
    /// Last raw reading, kept for counter-like kinds.
    pub last_reading: Option<f64>,
    /// Last value as written by the caller, `U` when unknown.
    pub last_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveState {
    pub spec: ArchiveSpec,
    /// Primary points collected towards the next row, per source.
    pub pending: Vec<Vec<Option<f64>>>,
    /// Ring buffer of consolidated rows; each row has one value per source.
    pub rows: Vec<Vec<Option<f64>>>,
    /// Next row to overwrite.
    pub cursor: usize,
}

impl ArchiveState {
    fn new(spec: ArchiveSpec, sources: usize) -> Self {
        Self {
            spec,
            pending: vec![Vec::new(); sources],
            rows: vec![vec![None; sources]; spec.rows as usize],
            cursor: 0,
        }
    }

    fn push(&mut self, pdp: &[Option<f64>]) {
        for (pending, value) in self.pending.iter_mut().zip(pdp) {
            pending.push(*value);
        }
        if self.pending.first().map_or(0, Vec::len) < self.spec.steps as usize {
            return;
        }

        let spec = self.spec;
        let row: Vec<Option<f64>> = self
            .pending
            .iter_mut()
            .map(|points| consolidate(&spec, &std::mem::take(points)))
            .collect();
        self.rows[self.cursor] = row;
        self.cursor = (self.cursor + 1) % self.rows.len();
    }

    /// Rows from oldest to newest.
    pub fn ordered_rows(&self) -> impl DoubleEndedIterator<Item = &Vec<Option<f64>>> {
        self.rows[self.cursor..].iter().chain(&self.rows[..self.cursor])
    }
}

fn consolidate(spec: &ArchiveSpec, points: &[Option<f64>]) -> Option<f64> {
    let known: Vec<f64> = points.iter().flatten().copied().collect();
    let unknown = (points.len() - known.len()) as f64 / points.len().max(1) as f64;
    if known.is_empty() || unknown > spec.xff {
        return None;
    }
    match spec.consolidation {
        Consolidation::Average => Some(known.iter().sum::<f64>() / known.len() as f64),
        Consolidation::Last => points.iter().rev().flatten().next().copied(),
        Consolidation::Min => known.iter().copied().reduce(f64::min),
        Consolidation::Max => known.iter().copied().reduce(f64::max),
    }
}

impl RrdFile {
    fn new(config: &TsConfig, start: i64) -> Self {
        let sources = config.data_sources.len();
        Self {
            step: config.step.max(1),
            last_update: start,
            sources: config
                .data_sources
                .iter()
                .map(|spec| SourceState {
                    spec: spec.clone(),
                    last_reading: None,
                    last_text: "U".to_string(),
                })
                .collect(),
            archives: config
                .archives
                .iter()
                .map(|spec| ArchiveState::new(*spec, sources))
                .collect(),
        }
    }

    /// Fold one update into the file.
    pub fn apply(&mut self, at: i64, readings: &[Option<f64>]) -> Result<(), TimeSeriesError> {
        if readings.len() != self.sources.len() {
            return Err(TimeSeriesError::Invalid(format!(
                "expected {} values, got {}",
                self.sources.len(),
                readings.len()
            )));
        }
        if at <= self.last_update {
            return Err(TimeSeriesError::StaleUpdate {
                at,
                last: self.last_update,
            });
        }

        let elapsed = (at - self.last_update) as f64;
        let pdp: Vec<Option<f64>> = self
            .sources
            .iter_mut()
            .zip(readings)
            .map(|(source, reading)| source.advance(*reading, elapsed))
            .collect();

        let step = self.step as i64;
        let crossed = (at.div_euclid(step) - self.last_update.div_euclid(step)).max(0) as u64;
        // Beyond the longest archive span every ring slot is overwritten anyway.
        let span = self
            .archives
            .iter()
            .map(|a| u64::from(a.spec.steps) * u64::from(a.spec.rows))
            .max()
            .unwrap_or(0);
        for _ in 0..crossed.min(span) {
            for archive in &mut self.archives {
                archive.push(&pdp);
            }
        }

        self.last_update = at;
        Ok(())
    }

    pub fn last_values(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.last_text.as_str()).collect()
    }
}

impl SourceState {
    /// Rate for this update, or `None` when unknown.
    fn advance(&mut self, reading: Option<f64>, elapsed: f64) -> Option<f64> {
        self.last_text = reading.map_or_else(|| "U".to_string(), |v| v.to_string());
        let previous = std::mem::replace(&mut self.last_reading, reading);

        if elapsed > self.spec.heartbeat as f64 {
            return None;
        }
        let value = reading?;
        let rate = match self.spec.kind {
            DataSourceKind::Gauge => value,
            DataSourceKind::Absolute => value / elapsed,
            DataSourceKind::Derive => (value - previous?) / elapsed,
            DataSourceKind::Counter => {
                let last = previous?;
                let mut delta = value - last;
                if delta < 0.0 {
                    delta += if last < COUNTER32_WRAP {
                        COUNTER32_WRAP
                    } else {
                        COUNTER64_WRAP
                    };
                }
                delta / elapsed
            }
        };

        let below = self.spec.min.is_some_and(|min| rate < min);
        let above = self.spec.max.is_some_and(|max| rate > max);
        if below || above { None } else { Some(rate) }
    }
}
