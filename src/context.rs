//! Run-wide context handed to every poller.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::AppConfig;
use crate::inventory::TemplateCache;
use crate::storage::{MutationSender, RowSource, TimeSeriesSink};

/// Everything a job shares across workers. Fixed before the pool starts.
#[derive(Clone)]
pub struct RunContext {
    /// Timestamp of every sample written by this run.
    pub poll_time: DateTime<Utc>,
    pub templates: Arc<TemplateCache>,
    pub sink: TimeSeriesSink,
    pub mutations: MutationSender,
    pub rows: Arc<dyn RowSource>,
    pub settings: Arc<AppConfig>,
}

impl RunContext {
    pub fn new(
        poll_time: DateTime<Utc>,
        sink: TimeSeriesSink,
        mutations: MutationSender,
        rows: Arc<dyn RowSource>,
        settings: Arc<AppConfig>,
    ) -> Self {
        Self {
            poll_time,
            templates: Arc::new(TemplateCache::new()),
            sink,
            mutations,
            rows,
            settings,
        }
    }

    pub fn with_templates(mut self, templates: TemplateCache) -> Self {
        self.templates = Arc::new(templates);
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("poll_time", &self.poll_time)
            .field("templates", &self.templates.len())
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}
