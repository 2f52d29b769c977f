//! Monitor service composition root
//!
//! Wires the checker, orchestrator, scheduler and aggregator together
//! behind one handle. All collaborators are injected, so tests swap in
//! memory stores, scripted pingers and fixed directories without any
//! global state.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::AvailabilityCheckResult;
use crate::aggregator::{Aggregator, ChartData, MonitoringStats, TimeRange};
use crate::batch::{BatchState, BatchStatus};
use crate::checker::{CheckerError, DeviceChecker};
use crate::config::Config;
use crate::directory::{DeviceDirectory, DeviceRegistry};
use crate::orchestrator::FleetOrchestrator;
use crate::plugin::CapabilityRegistry;
use crate::probe::Pinger;
use crate::scheduler::Scheduler;
use crate::settings::{self, SettingsStore};
use crate::storage::CheckStore;

const FLEET_CHECK_TASK: &str = "availability_check";
const DEVICE_SYNC_TASK: &str = "device_sync";

/// Everything the service needs, injected by the caller.
pub struct ServiceDeps {
    pub store: Arc<dyn CheckStore>,
    pub directory: Arc<dyn DeviceDirectory>,
    pub settings: Arc<dyn SettingsStore>,
    pub pinger: Arc<dyn Pinger>,
    pub plugins: Arc<CapabilityRegistry>,
}

/// The availability monitor, fully assembled.
pub struct MonitorService {
    config: Config,
    store: Arc<dyn CheckStore>,
    directory: Arc<dyn DeviceDirectory>,
    settings: Arc<dyn SettingsStore>,
    registry: Arc<DeviceRegistry>,
    checker: Arc<DeviceChecker>,
    orchestrator: Arc<FleetOrchestrator>,
    aggregator: Aggregator,
    scheduler: Scheduler,
}

impl MonitorService {
    pub fn new(config: Config, deps: ServiceDeps) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let batch = Arc::new(BatchState::new());

        let checker = Arc::new(DeviceChecker::new(
            config.probe.clone(),
            deps.pinger,
            Arc::clone(&deps.store),
            deps.plugins,
            Arc::clone(&registry),
        ));

        let orchestrator = Arc::new(FleetOrchestrator::new(
            Arc::clone(&checker),
            Arc::clone(&registry),
            Arc::clone(&batch),
        ));

        let aggregator = Aggregator::new(
            Arc::clone(&deps.store),
            Arc::clone(&registry),
            batch,
            Arc::clone(&deps.settings),
        );

        Self {
            config,
            store: deps.store,
            directory: deps.directory,
            settings: deps.settings,
            registry,
            checker,
            orchestrator,
            aggregator,
            scheduler: Scheduler::new(),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Sync the fleet once and register the recurring tasks.
    #[instrument(skip(self))]
    pub async fn start(&self) -> anyhow::Result<()> {
        // an unreachable directory at boot is not fatal; the sync task
        // retries on its own cadence
        match self.registry.sync_from(self.directory.as_ref()).await {
            Ok(count) => info!("initial device sync loaded {count} devices"),
            Err(e) => warn!("initial device sync failed: {e:#}"),
        }

        let registry = Arc::clone(&self.registry);
        let directory = Arc::clone(&self.directory);
        self.scheduler
            .schedule_minutes(DEVICE_SYNC_TASK, self.config.sync_interval_minutes, move || {
                let registry = Arc::clone(&registry);
                let directory = Arc::clone(&directory);
                async move {
                    registry.sync_from(directory.as_ref()).await?;
                    Ok(())
                }
            })
            .await;

        let interval = settings::get_check_interval(self.settings.as_ref()).await;
        self.schedule_fleet_task(interval).await;

        info!("monitor service started");
        Ok(())
    }

    /// Cancel the recurring tasks, any manual batch, and close the store.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        self.orchestrator.shutdown().await;

        if let Err(e) = self.store.close().await {
            warn!("store did not close cleanly: {e}");
        }

        info!("monitor service stopped");
    }

    async fn schedule_fleet_task(&self, interval_minutes: u32) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let cap = self.config.max_concurrent_checks;

        self.scheduler
            .schedule_minutes(FLEET_CHECK_TASK, interval_minutes, move || {
                let orchestrator = Arc::clone(&orchestrator);
                async move {
                    orchestrator.check_all(cap).await;
                    Ok(())
                }
            })
            .await;
    }

    /// Check one device right now.
    pub async fn check_device(
        &self,
        device_id: i64,
    ) -> Result<AvailabilityCheckResult, CheckerError> {
        self.checker.check_by_id(device_id).await
    }

    /// Check the whole fleet and wait for all results. Does not touch
    /// the pollable manual-run status.
    pub async fn check_all(&self) -> Vec<AvailabilityCheckResult> {
        self.orchestrator
            .check_all(self.config.max_concurrent_checks)
            .await
    }

    /// Kick off a background fleet check; poll with
    /// [`MonitorService::get_batch_status`].
    pub async fn run_checks(&self, max_concurrent: Option<usize>) -> BatchStatus {
        let cap = max_concurrent.unwrap_or(self.config.max_concurrent_checks);
        self.orchestrator.start_background_run(cap).await
    }

    pub async fn get_batch_status(&self) -> BatchStatus {
        self.orchestrator.batch().status().await
    }

    pub async fn get_partial_results(&self) -> Vec<AvailabilityCheckResult> {
        self.orchestrator.batch().partial_results().await
    }

    /// Latest persisted result per device.
    pub async fn get_latest(&self) -> anyhow::Result<Vec<AvailabilityCheckResult>> {
        self.aggregator.latest_state().await
    }

    /// The most recent checks for one device, newest first.
    pub async fn get_history(
        &self,
        device_id: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<AvailabilityCheckResult>> {
        let rows = self.store.history(device_id, limit).await?;
        Ok(rows.into_iter().map(|row| row.into_result()).collect())
    }

    pub async fn get_chart_data(&self, device_id: i64, days: u32) -> anyhow::Result<ChartData> {
        self.aggregator.chart_data(device_id, days).await
    }

    pub async fn get_stats(&self, range: TimeRange) -> anyhow::Result<MonitoringStats> {
        self.aggregator.stats(range).await
    }

    pub async fn get_check_interval(&self) -> u32 {
        settings::get_check_interval(self.settings.as_ref()).await
    }

    /// Persist a new check interval and move the fleet task to it.
    /// Returns the clamped value actually in effect.
    pub async fn set_check_interval(&self, minutes: u32) -> u32 {
        let stored = settings::set_check_interval(self.settings.as_ref(), minutes).await;
        self.schedule_fleet_task(stored).await;
        info!("check interval set to {stored} minutes");
        stored
    }
}
