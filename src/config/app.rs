//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigError, ensure, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default mutation queue capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Default number of concurrent device workers.
pub const DEFAULT_WORKERS: usize = 16;

pub const DEFAULT_SNMP_PORT: u16 = 161;
pub const DEFAULT_SNMP_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_SNMP_RETRIES: u32 = 1;
pub const DEFAULT_MAX_OIDS: usize = 20;
pub const DEFAULT_MAX_WALK_ROWS: usize = 65_536;

pub const DEFAULT_TELNET_PORT: u16 = 23;
pub const DEFAULT_TELNET_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 1;

pub const DEFAULT_ROUTEROS_PORT: u16 = 8728;
pub const DEFAULT_ROUTEROS_TIMEOUT: Duration = Duration::from_secs(3);

/// Default page size of the time-series import.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Relational store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: PathBuf,

    /// Mutation queue capacity (default: 10000).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("netharvest.db"),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

// =============================================================================
// Time-series Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    /// Base directory of the round-robin files.
    pub dir: PathBuf,

    /// Rows per page read by the time-series import.
    pub page_size: usize,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("rrd"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

// =============================================================================
// Protocol Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub port: u16,

    /// Per-request timeout; doubled on every retry.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    pub retries: u32,

    /// Max OIDs per request.
    pub max_oids: usize,

    /// Hard cap on rows returned by one walk.
    pub max_walk_rows: usize,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SNMP_PORT,
            timeout: DEFAULT_SNMP_TIMEOUT,
            retries: DEFAULT_SNMP_RETRIES,
            max_oids: DEFAULT_MAX_OIDS,
            max_walk_rows: DEFAULT_MAX_WALK_ROWS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelnetConfig {
    pub port: u16,

    /// Connect timeout and per-step read/write deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Reconnects allowed per device session.
    pub reconnect_attempts: u32,
}

impl Default for TelnetConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_TELNET_PORT,
            timeout: DEFAULT_TELNET_TIMEOUT,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOsConfig {
    pub port: u16,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Record unknown neighbors in `mt_new_boards`.
    pub register_new_boards: bool,
}

impl Default for RouterOsConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_ROUTEROS_PORT,
            timeout: DEFAULT_ROUTEROS_TIMEOUT,
            register_new_boards: false,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub timeseries: TimeSeriesConfig,

    /// Concurrent device workers (default: 16).
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub snmp: SnmpConfig,

    #[serde(default)]
    pub telnet: TelnetConfig,

    #[serde(default)]
    pub routeros: RouterOsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            timeseries: TimeSeriesConfig::default(),
            workers: DEFAULT_WORKERS,
            snmp: SnmpConfig::default(),
            telnet: TelnetConfig::default(),
            routeros: RouterOsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(!self.database.path.as_os_str().is_empty(), || {
            "database path must not be empty".to_string()
        })?;
        ensure(self.database.channel_capacity > 0, || {
            "database channel_capacity must be positive".to_string()
        })?;
        ensure(self.timeseries.page_size > 0, || {
            "timeseries page_size must be positive".to_string()
        })?;
        ensure(self.workers > 0, || "workers must be positive".to_string())?;

        ensure(self.snmp.port != 0, || "snmp port must be non-zero".to_string())?;
        ensure(!self.snmp.timeout.is_zero(), || {
            "snmp timeout must be positive".to_string()
        })?;
        ensure(self.snmp.max_oids > 0, || "snmp max_oids must be positive".to_string())?;
        ensure(self.snmp.max_walk_rows > 0, || {
            "snmp max_walk_rows must be positive".to_string()
        })?;

        ensure(self.telnet.port != 0, || "telnet port must be non-zero".to_string())?;
        ensure(!self.telnet.timeout.is_zero(), || {
            "telnet timeout must be positive".to_string()
        })?;

        ensure(self.routeros.port != 0, || {
            "routeros port must be non-zero".to_string()
        })?;
        ensure(!self.routeros.timeout.is_zero(), || {
            "routeros timeout must be positive".to_string()
        })?;

        Ok(())
    }
}
