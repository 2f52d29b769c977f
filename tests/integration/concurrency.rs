//! Fleet fan-out under the concurrency limiter and the manual
//! run-checks poll cycle.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fleetwatch::config::Config;
use fleetwatch::plugin::CapabilityRegistry;
use fleetwatch::probe::Pinger;
use pretty_assertions::assert_eq;

use crate::helpers::{build_service_with, fast_probe_config, test_device, wait_for_batch};

/// Pinger that records the high-water mark of concurrent probes.
struct GaugedPinger {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl GaugedPinger {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Pinger for GaugedPinger {
    async fn ping(&self, _address: IpAddr, _timeout: Duration) -> anyhow::Result<Option<f64>> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(15)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(2.0))
    }
}

fn capped_config(cap: usize) -> Config {
    Config {
        probe: fast_probe_config(),
        max_concurrent_checks: cap,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_fleet_check_respects_concurrency_cap() {
    let pinger = GaugedPinger::new();
    let (service, store) = build_service_with(
        capped_config(5),
        vec![],
        pinger.clone(),
        Arc::new(CapabilityRegistry::new()),
    );

    for id in 1..=20 {
        service.registry().insert(test_device(id)).await;
    }

    let results = service.check_all().await;

    assert_eq!(results.len(), 20);
    assert_eq!(store.len().await, 20);

    let peak = pinger.peak.load(Ordering::SeqCst);
    assert!(peak <= 5, "limiter admitted {peak} concurrent checks");
}

#[tokio::test]
async fn test_manual_run_returns_immediately_and_is_pollable() {
    let (service, store) = build_service_with(
        capped_config(10),
        vec![],
        GaugedPinger::new(),
        Arc::new(CapabilityRegistry::new()),
    );

    for id in 1..=6 {
        service.registry().insert(test_device(id)).await;
    }

    let status = service.run_checks(Some(2)).await;
    assert!(status.in_progress);
    assert_eq!(status.total, 6);
    assert!(status.started_at.is_some());

    wait_for_batch(&service).await;

    let status = service.get_batch_status().await;
    assert_eq!(status.completed, 6);

    let partial = service.get_partial_results().await;
    assert_eq!(partial.len(), 6);
    // partial results come back in device-id order
    let ids: Vec<i64> = partial.iter().map(|r| r.device_id).collect();
    assert_eq!(ids, (1..=6).collect::<Vec<i64>>());

    assert_eq!(store.len().await, 6);
    service.stop().await;
}

#[tokio::test]
async fn test_second_manual_run_does_not_preempt_the_first() {
    let (service, _store) = build_service_with(
        capped_config(1),
        vec![],
        GaugedPinger::new(),
        Arc::new(CapabilityRegistry::new()),
    );

    for id in 1..=8 {
        service.registry().insert(test_device(id)).await;
    }

    let first = service.run_checks(Some(1)).await;
    assert!(first.in_progress);
    let started = first.started_at;

    // refused while the first batch is still draining
    let second = service.run_checks(Some(50)).await;
    assert_eq!(second.started_at, started);

    wait_for_batch(&service).await;
    assert_eq!(service.get_batch_status().await.completed, 8);

    service.stop().await;
}
