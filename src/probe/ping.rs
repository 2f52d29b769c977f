//! ICMP-style ping probe
//!
//! Raw pings block, so the system pinger shells out to the OS `ping`
//! binary from `spawn_blocking`, admitted through a semaphore that caps
//! how many blocking workers can be tied up at once. The `Pinger` trait
//! is the seam tests use to substitute deterministic responders.
//!
//! An echo that comes back in exactly 0 ms is treated as suspicious and
//! rejected: buggy stacks report instant replies for hosts that are not
//! actually up, and a false-negative is preferred over a false-positive.

use std::net::IpAddr;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{instrument, trace, warn};

/// Verdict of one echo probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingProbe {
    pub available: bool,
    pub latency_ms: Option<f64>,
}

/// A single echo-style reachability test.
///
/// `Ok(Some(ms))` is a reply with its round-trip time, `Ok(None)` is a
/// clean "no reply", `Err` is a probe-level failure (missing binary,
/// worker pool shut down, ...).
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, address: IpAddr, timeout: Duration) -> anyhow::Result<Option<f64>>;
}

/// Pinger backed by the OS `ping` binary on a bounded blocking pool.
pub struct SystemPinger {
    workers: Arc<Semaphore>,
}

impl SystemPinger {
    pub fn new(max_workers: usize) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }
}

#[async_trait]
impl Pinger for SystemPinger {
    #[instrument(skip(self))]
    async fn ping(&self, address: IpAddr, timeout: Duration) -> anyhow::Result<Option<f64>> {
        let _permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .context("ping worker pool closed")?;

        let timeout_secs = timeout.as_secs().max(1);

        let output = tokio::task::spawn_blocking(move || {
            Command::new("ping")
                .arg("-n")
                .arg("-c")
                .arg("1")
                .arg("-W")
                .arg(timeout_secs.to_string())
                .arg(address.to_string())
                .output()
        })
        .await
        .context("ping worker panicked")?
        .context("failed to execute ping")?;

        if !output.status.success() {
            trace!("ping to {address} got no reply");
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_echo_time(&stdout))
    }
}

/// Extract the round-trip time from `ping` output ("time=12.3 ms").
fn parse_echo_time(output: &str) -> Option<f64> {
    output
        .split_whitespace()
        .find_map(|token| token.strip_prefix("time="))
        .and_then(|value| value.parse::<f64>().ok())
}

/// Issue one echo probe through `pinger` and apply the validity rules.
pub async fn probe_ping(pinger: &dyn Pinger, address: IpAddr, timeout: Duration) -> PingProbe {
    match pinger.ping(address, timeout).await {
        Ok(Some(latency_ms)) if latency_ms > 0.0 => {
            trace!("ping success for {address}: {latency_ms:.2}ms");
            PingProbe {
                available: true,
                latency_ms: Some(latency_ms),
            }
        }
        Ok(Some(_)) => {
            // exactly zero: reject as a bogus reply
            trace!("ping to {address} returned suspicious zero time - rejecting");
            PingProbe {
                available: false,
                latency_ms: None,
            }
        }
        Ok(None) => PingProbe {
            available: false,
            latency_ms: None,
        },
        Err(e) => {
            warn!("ping error for {address}: {e:#}");
            PingProbe {
                available: false,
                latency_ms: None,
            }
        }
    }
}
