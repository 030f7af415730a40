//! Configuration for netharvest runs.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Relational store (path, mutation queue capacity)
//! - Time-series base directory and import page size
//! - Worker count
//! - Per-protocol ports, timeouts and retry budgets

mod app;
mod validation;

pub use app::{
    AppConfig, DatabaseConfig, RouterOsConfig, SnmpConfig, TelnetConfig, TimeSeriesConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_PAGE_SIZE, DEFAULT_WORKERS};
