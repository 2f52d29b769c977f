use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./availability.db")
}

/// Probe tuning.
///
/// The source systems disagreed on thresholds and port lists between
/// deployments, so all of them are configuration with the most recent
/// values as defaults rather than hard-coded constants.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    /// Candidate TCP ports probed concurrently
    #[serde(default = "default_probe_ports")]
    pub ports: Vec<u16>,

    /// Per-connection timeout for the port probe
    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Per-echo timeout for the ping probe
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// How many echo attempts a ping fallback makes
    #[serde(default = "default_ping_attempts")]
    pub ping_attempts: u32,

    /// Strictly more than this many attempts must succeed for the device
    /// to count as reachable via ping. The default of 2 out of 3 attempts
    /// means all three must answer, biasing toward false-negatives.
    #[serde(default = "default_ping_required_successes")]
    pub ping_required_successes: u32,

    /// Size of the blocking worker pool that runs raw pings
    #[serde(default = "default_ping_workers")]
    pub ping_workers: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ports: default_probe_ports(),
            port_timeout_ms: default_port_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
            ping_attempts: default_ping_attempts(),
            ping_required_successes: default_ping_required_successes(),
            ping_workers: default_ping_workers(),
        }
    }
}

impl ProbeConfig {
    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

fn default_probe_ports() -> Vec<u16> {
    vec![80, 22, 443, 8080, 3389]
}

fn default_port_timeout_ms() -> u64 {
    1000
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_ping_attempts() -> u32 {
    3
}

fn default_ping_required_successes() -> u32 {
    2
}

fn default_ping_workers() -> usize {
    8
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Base URL of the device directory service
    pub directory_url: Option<String>,

    #[serde(default)]
    pub probe: ProbeConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Concurrency cap for fleet-wide checks
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,

    /// Fallback check interval used until the settings store says otherwise
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u32,

    /// How often the device directory is re-synced
    #[serde(default = "default_sync_interval")]
    pub sync_interval_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory_url: None,
            probe: ProbeConfig::default(),
            storage: None,
            max_concurrent_checks: default_max_concurrent(),
            check_interval_minutes: default_check_interval(),
            sync_interval_minutes: default_sync_interval(),
        }
    }
}

fn default_max_concurrent() -> usize {
    crate::orchestrator::DEFAULT_MAX_CONCURRENT
}

fn default_check_interval() -> u32 {
    1
}

fn default_sync_interval() -> u32 {
    1
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
