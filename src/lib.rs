pub mod aggregator;
pub mod batch;
pub mod checker;
pub mod config;
pub mod directory;
pub mod orchestrator;
pub mod plugin;
pub mod probe;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod storage;
pub mod util;

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored device as seen by the core.
///
/// Owned by the external device directory; the core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub address: IpAddr,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Non-network devices are checked through their plugin capability
    /// instead of the port/ping chain.
    #[serde(default)]
    pub kind: DeviceKind,
}

fn default_active() -> bool {
    true
}

/// How a device is reached during an availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Reachable over the network, probed with ports and ping.
    #[default]
    Network,
    /// Checked through a registered plugin capability.
    Plugin,
}

/// The probe that produced an availability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMethod {
    PortCheck,
    Ping,
    Plugin,
    Error,
    AllFailed,
}

impl std::fmt::Display for CheckMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckMethod::PortCheck => write!(f, "port_check"),
            CheckMethod::Ping => write!(f, "ping"),
            CheckMethod::Plugin => write!(f, "plugin"),
            CheckMethod::Error => write!(f, "error"),
            CheckMethod::AllFailed => write!(f, "all_failed"),
        }
    }
}

/// Outcome of one availability check for one device.
///
/// Immutable once created. Exactly one of these is appended to the check
/// store per (device, check) attempt; `write_failed` is set when that
/// append failed but the in-memory result is still returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityCheckResult {
    pub device_id: i64,
    pub device_name: String,
    pub available: bool,
    pub latency_ms: Option<f64>,
    pub method: CheckMethod,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub write_failed: bool,
}

impl AvailabilityCheckResult {
    /// Result for a check that failed before any probe could finish.
    pub fn error(
        device_id: i64,
        device_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
            available: false,
            latency_ms: None,
            method: CheckMethod::Error,
            error: Some(message.into()),
            timestamp: Utc::now(),
            write_failed: false,
        }
    }
}
