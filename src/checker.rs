//! Device availability checker
//!
//! Runs the probe fallback chain for one device and persists exactly one
//! result per invocation:
//!
//! 1. concurrent TCP port sweep - success short-circuits;
//! 2. three sequential pings - strictly more than the configured success
//!    threshold must answer (2 out of 3 attempts by default, so all
//!    three), a deliberate bias toward false-negatives;
//! 3. otherwise the device is down via `all_failed`.
//!
//! Plugin-kind devices skip the chain and go through their capability.
//! Whatever goes wrong inside a check is folded into a method=`error`
//! result; the checker never propagates probe failures to its caller.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::ProbeConfig;
use crate::directory::DeviceRegistry;
use crate::plugin::CapabilityRegistry;
use crate::probe::{Pinger, probe_ping, probe_ports};
use crate::storage::{CheckRow, CheckStore};
use crate::{AvailabilityCheckResult, CheckMethod, Device, DeviceKind};

pub const UNREACHABLE_MESSAGE: &str = "Device is not reachable via ports or ping";

/// Structured checker failures surfaced to API callers.
#[derive(Debug)]
pub enum CheckerError {
    DeviceNotFound(i64),
}

impl fmt::Display for CheckerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckerError::DeviceNotFound(id) => write!(f, "device {} not found", id),
        }
    }
}

impl std::error::Error for CheckerError {}

/// Internal probe verdict before persistence.
struct Verdict {
    available: bool,
    latency_ms: Option<f64>,
    method: CheckMethod,
    error: Option<String>,
}

/// Per-device check orchestration.
///
/// Stateless between invocations and safe to call concurrently across
/// different devices; every collaborator is shared behind an `Arc`.
pub struct DeviceChecker {
    probe: ProbeConfig,
    pinger: Arc<dyn Pinger>,
    store: Arc<dyn CheckStore>,
    plugins: Arc<CapabilityRegistry>,
    registry: Arc<DeviceRegistry>,
}

impl DeviceChecker {
    pub fn new(
        probe: ProbeConfig,
        pinger: Arc<dyn Pinger>,
        store: Arc<dyn CheckStore>,
        plugins: Arc<CapabilityRegistry>,
        registry: Arc<DeviceRegistry>,
    ) -> Self {
        Self {
            probe,
            pinger,
            store,
            plugins,
            registry,
        }
    }

    /// Check a device by id, resolving it through the registry.
    pub async fn check_by_id(&self, device_id: i64) -> Result<AvailabilityCheckResult, CheckerError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or(CheckerError::DeviceNotFound(device_id))?;

        Ok(self.check(&device).await)
    }

    /// Run the full check for one device and persist the outcome.
    #[instrument(skip(self, device), fields(device = %device.name, address = %device.address))]
    pub async fn check(&self, device: &Device) -> AvailabilityCheckResult {
        debug!("checking availability");

        let verdict = match device.kind {
            DeviceKind::Network => self.probe_network(device).await,
            DeviceKind::Plugin => match self.probe_plugin(device).await {
                Ok(verdict) => verdict,
                Err(e) => Verdict {
                    available: false,
                    latency_ms: None,
                    method: CheckMethod::Error,
                    error: Some(format!("{e:#}")),
                },
            },
        };

        let mut result = AvailabilityCheckResult {
            device_id: device.id,
            device_name: device.name.clone(),
            available: verdict.available,
            latency_ms: verdict.latency_ms,
            method: verdict.method,
            error: verdict.error,
            timestamp: Utc::now(),
            write_failed: false,
        };

        if let Err(e) = self.store.append_check(CheckRow::from_result(&result)).await {
            warn!("failed to persist check for {}: {}", device.name, e);
            result.write_failed = true;
        }

        debug!(
            "result: {} via {}",
            if result.available {
                "available"
            } else {
                "not available"
            },
            result.method
        );

        result
    }

    /// Port sweep, then the triple-ping fallback.
    async fn probe_network(&self, device: &Device) -> Verdict {
        let ports = probe_ports(device.address, &self.probe.ports, self.probe.port_timeout()).await;

        if ports.available {
            return Verdict {
                available: true,
                latency_ms: ports.latency_ms,
                method: CheckMethod::PortCheck,
                error: None,
            };
        }

        debug!("port check failed for {}, trying ping", device.name);

        let mut successes = 0u32;
        let mut total_latency = 0.0f64;

        for attempt in 1..=self.probe.ping_attempts {
            debug!(
                "ping attempt {attempt}/{} for {}",
                self.probe.ping_attempts, device.name
            );

            let ping =
                probe_ping(self.pinger.as_ref(), device.address, self.probe.ping_timeout()).await;

            if ping.available {
                successes += 1;
                if let Some(latency) = ping.latency_ms {
                    total_latency += latency;
                }
            }
        }

        // strictly more than the threshold, not at-least
        if successes > self.probe.ping_required_successes {
            Verdict {
                available: true,
                latency_ms: Some(total_latency / successes as f64),
                method: CheckMethod::Ping,
                error: None,
            }
        } else {
            Verdict {
                available: false,
                latency_ms: None,
                method: CheckMethod::AllFailed,
                error: Some(UNREACHABLE_MESSAGE.to_string()),
            }
        }
    }

    /// Capability-based check for non-network devices.
    async fn probe_plugin(&self, device: &Device) -> anyhow::Result<Verdict> {
        let binding = self
            .plugins
            .binding_for(device.id)
            .await
            .ok_or_else(|| anyhow::anyhow!("No plugin configured for this device"))?;

        let start = Instant::now();

        let verdict = match binding.capability.get_status(&binding.params).await {
            Ok(status) => {
                let reported = status.get("is_available").and_then(Value::as_bool);
                match reported {
                    Some(available) => Verdict {
                        available,
                        latency_ms: None,
                        method: CheckMethod::Plugin,
                        error: status
                            .get("error")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                    // status payload without a verdict: fall back to connect
                    None => self.connect_verdict(&binding).await?,
                }
            }
            Err(_) => self.connect_verdict(&binding).await?,
        };

        Ok(Verdict {
            latency_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
            ..verdict
        })
    }

    async fn connect_verdict(&self, binding: &crate::plugin::PluginBinding) -> anyhow::Result<Verdict> {
        let available = binding.capability.connect(&binding.params).await?;
        Ok(Verdict {
            available,
            latency_ms: None,
            method: CheckMethod::Plugin,
            error: (!available).then(|| "Connect method returned False".to_string()),
        })
    }
}
