//! Check row definition
//!
//! One row per (device, check) attempt, append-only. The device name is
//! denormalized onto the row so aggregation never needs to reach back
//! into the device directory for devices that have since disappeared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AvailabilityCheckResult, CheckMethod};

/// A single availability check stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRow {
    /// When the check finished (always UTC)
    pub timestamp: DateTime<Utc>,

    pub device_id: i64,

    pub device_name: String,

    pub available: bool,

    /// Round-trip latency in milliseconds; absent for failed checks
    pub latency_ms: Option<f64>,

    /// Which probe produced the verdict
    pub method: CheckMethod,

    pub error: Option<String>,
}

impl CheckRow {
    pub fn from_result(result: &AvailabilityCheckResult) -> Self {
        Self {
            timestamp: result.timestamp,
            device_id: result.device_id,
            device_name: result.device_name.clone(),
            available: result.available,
            latency_ms: result.latency_ms,
            method: result.method,
            error: result.error.clone(),
        }
    }

    pub fn into_result(self) -> AvailabilityCheckResult {
        AvailabilityCheckResult {
            device_id: self.device_id,
            device_name: self.device_name,
            available: self.available,
            latency_ms: self.latency_ms,
            method: self.method,
            error: self.error,
            timestamp: self.timestamp,
            write_failed: false,
        }
    }
}

impl CheckMethod {
    /// Parse the stored tag back into a method; unknown tags fold into
    /// `Error` so old rows never poison a query.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "port_check" => CheckMethod::PortCheck,
            "ping" => CheckMethod::Ping,
            "plugin" => CheckMethod::Plugin,
            "all_failed" => CheckMethod::AllFailed,
            _ => CheckMethod::Error,
        }
    }
}
