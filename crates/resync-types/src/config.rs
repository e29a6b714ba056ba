//! Configuration loading for index-resync.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/index-resync/config.toml.
//!
//! Reconciliation thresholds are carried in an explicit [`ReconcileConfig`]
//! that callers pass to the job; nothing reads them from global state.

use chrono::Duration;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ResyncError;

/// Thresholds and switches for one reconciliation run.
///
/// `time_until_reindex_ms` and `batch_size` have no serde defaults: a config
/// section that omits them fails to load instead of running with undefined
/// thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Minimum age (ms since last write) before an entry may be repaired.
    /// Must comfortably exceed the longest expected write transaction.
    pub time_until_reindex_ms: i64,

    /// Maximum number of entries fetched per page.
    pub batch_size: usize,

    /// Entries of one page processed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Also purge confirmed entries whose record is gone.
    #[serde(default = "default_true")]
    pub purge_confirmed_orphans: bool,

    /// Decide and count without touching the index.
    #[serde(default)]
    pub dry_run: bool,

    /// Run lease expiry; a crashed holder blocks new runs at most this long.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: i64,
}

fn default_time_until_reindex_ms() -> i64 {
    600_000 // 10 minutes
}

fn default_batch_size() -> usize {
    100
}

fn default_concurrency() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_lease_ttl_ms() -> i64 {
    3_600_000
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            time_until_reindex_ms: default_time_until_reindex_ms(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            purge_confirmed_orphans: true,
            dry_run: false,
            lease_ttl_ms: default_lease_ttl_ms(),
        }
    }
}

impl ReconcileConfig {
    pub fn with_time_until_reindex_ms(mut self, ms: i64) -> Self {
        self.time_until_reindex_ms = ms;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn with_purge_confirmed_orphans(mut self, enabled: bool) -> Self {
        self.purge_confirmed_orphans = enabled;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_lease_ttl_ms(mut self, ms: i64) -> Self {
        self.lease_ttl_ms = ms;
        self
    }

    /// Staleness threshold as a duration
    pub fn time_until_reindex(&self) -> Duration {
        Duration::milliseconds(self.time_until_reindex_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::milliseconds(self.lease_ttl_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ResyncError> {
        if self.time_until_reindex_ms < 0 {
            return Err(ResyncError::Config(format!(
                "time_until_reindex_ms must be >= 0, got {}",
                self.time_until_reindex_ms
            )));
        }
        if self.batch_size == 0 {
            return Err(ResyncError::Config("batch_size must be > 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ResyncError::Config("concurrency must be > 0".to_string()));
        }
        if self.lease_ttl_ms <= 0 {
            return Err(ResyncError::Config(format!(
                "lease_ttl_ms must be > 0, got {}",
                self.lease_ttl_ms
            )));
        }
        Ok(())
    }
}

/// Scheduling of the background resync job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    /// Register the cron job when the daemon starts
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression (5-field or 6-field with seconds)
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone for the cron expression
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum random delay before each scheduled run
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,
}

fn default_cron() -> String {
    "*/30 * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_jitter_secs() -> u64 {
    30
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_cron(),
            timezone: default_timezone(),
            jitter_secs: default_jitter_secs(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to the RocksDB system-of-record directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to the Tantivy index directory
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub schedule: ScheduleSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "index-resync")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_index_path() -> String {
    ProjectDirs::from("", "", "index-resync")
        .map(|p| p.data_local_dir().join("search-index"))
        .unwrap_or_else(|| PathBuf::from("./search-index"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_path: default_index_path(),
            log_level: default_log_level(),
            reconcile: ReconcileConfig::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/index-resync/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (RESYNC_*, nested keys joined with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ResyncError> {
        let config_dir = ProjectDirs::from("", "", "index-resync")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");
        let defaults = Settings::default();

        let mut builder = Config::builder()
            .set_default("db_path", defaults.db_path)
            .map_err(|e| ResyncError::Config(e.to_string()))?
            .set_default("index_path", defaults.index_path)
            .map_err(|e| ResyncError::Config(e.to_string()))?
            .set_default("log_level", defaults.log_level)
            .map_err(|e| ResyncError::Config(e.to_string()))?
            .set_default(
                "reconcile.time_until_reindex_ms",
                defaults.reconcile.time_until_reindex_ms,
            )
            .map_err(|e| ResyncError::Config(e.to_string()))?
            .set_default("reconcile.batch_size", defaults.reconcile.batch_size as i64)
            .map_err(|e| ResyncError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // e.g. RESYNC_LOG_LEVEL, RESYNC_RECONCILE__BATCH_SIZE
        builder = builder.add_source(
            Environment::with_prefix("RESYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ResyncError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ResyncError::Config(e.to_string()))
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        expand_home(&self.index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
