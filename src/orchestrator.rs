//! Fleet check orchestrator
//!
//! Fans one checker invocation out per active device, admitted through a
//! counting semaphore so at most `max_concurrent` checks are in flight.
//! A batch always runs to completion: a check that escapes the checker's
//! own error handling (a panic, a closed semaphore) is converted into an
//! error-tagged result instead of aborting the rest of the fleet.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::batch::{BatchState, BatchStatus};
use crate::{AvailabilityCheckResult, Device};
use crate::checker::DeviceChecker;
use crate::directory::DeviceRegistry;

/// Default concurrency cap for scheduled fleet checks.
pub const DEFAULT_MAX_CONCURRENT: usize = 50;

/// Manual triggers may raise the cap, but never past this.
pub const MAX_MANUAL_CONCURRENT: usize = 100;

/// Runs the checker across the whole fleet under a concurrency cap.
pub struct FleetOrchestrator {
    checker: Arc<DeviceChecker>,
    registry: Arc<DeviceRegistry>,
    batch: Arc<BatchState>,

    /// Owner of the currently running manual batch, if any. Kept so
    /// shutdown can cancel it instead of leaving an orphan task.
    manual_run: Mutex<Option<JoinHandle<()>>>,
}

impl FleetOrchestrator {
    pub fn new(
        checker: Arc<DeviceChecker>,
        registry: Arc<DeviceRegistry>,
        batch: Arc<BatchState>,
    ) -> Self {
        Self {
            checker,
            registry,
            batch,
            manual_run: Mutex::new(None),
        }
    }

    pub fn batch(&self) -> &Arc<BatchState> {
        &self.batch
    }

    /// Check every active device and wait for the whole batch.
    ///
    /// The fleet is snapshotted once up front; devices added afterwards
    /// join the next batch. Result order is unspecified.
    ///
    /// Scheduled cycles go through here and never touch the manual-run
    /// bookkeeping: a caller polling a manual batch must not have its
    /// partial results reset by the recurring task.
    #[instrument(skip(self))]
    pub async fn check_all(&self, max_concurrent: usize) -> Vec<AvailabilityCheckResult> {
        let devices = self.registry.active_snapshot().await;
        self.run_batch(devices, max_concurrent, None).await
    }

    /// Run one batch over an already-snapshotted fleet. Progress is
    /// recorded into `batch` when given; the caller must have reset it.
    async fn run_batch(
        &self,
        devices: Vec<Device>,
        max_concurrent: usize,
        batch: Option<Arc<BatchState>>,
    ) -> Vec<AvailabilityCheckResult> {
        let total = devices.len();
        info!("starting fleet check for {total} devices (cap {max_concurrent})");

        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let mut handles = Vec::with_capacity(total);
        for device in devices {
            let semaphore = Arc::clone(&semaphore);
            let checker = Arc::clone(&self.checker);
            let batch = batch.clone();

            let device_id = device.id;
            let device_name = device.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| anyhow::anyhow!("limiter closed: {e}"))?;

                let result = checker.check(&device).await;
                if let Some(batch) = &batch {
                    batch.record(result.clone()).await;
                }
                Ok::<_, anyhow::Error>(result)
            });

            handles.push((device_id, device_name, handle));
        }

        let mut results = Vec::with_capacity(total);
        for (device_id, device_name, handle) in handles {
            let fallback = |message: String| {
                AvailabilityCheckResult::error(device_id, device_name.clone(), message)
            };

            let result = match handle.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    error!("check task for device {device_id} failed: {e:#}");
                    let result = fallback(e.to_string());
                    if let Some(batch) = &batch {
                        batch.record(result.clone()).await;
                    }
                    result
                }
                Err(e) => {
                    error!("check task for device {device_id} panicked: {e}");
                    let result = fallback(e.to_string());
                    if let Some(batch) = &batch {
                        batch.record(result.clone()).await;
                    }
                    result
                }
            };
            results.push(result);
        }

        if let Some(batch) = &batch {
            batch.finish().await;
        }
        info!("fleet check complete: {} results", results.len());

        results
    }

    /// Kick off a manual fleet check in the background.
    ///
    /// Returns the batch status right after the reset so the caller can
    /// start polling. Refused (returning the live status) when a batch
    /// is already in progress.
    pub async fn start_background_run(self: &Arc<Self>, max_concurrent: usize) -> BatchStatus {
        // held across the in-progress check, reset and spawn so two
        // simultaneous triggers cannot both pass the check and abort a
        // live batch
        let mut manual_run = self.manual_run.lock().await;

        let status = self.batch.status().await;
        if status.in_progress {
            debug!("fleet check already in progress, not starting another");
            return status;
        }

        let cap = max_concurrent.clamp(1, MAX_MANUAL_CONCURRENT);

        // snapshot and reset before spawning so the returned status
        // already reflects the new batch
        let devices = self.registry.active_snapshot().await;
        self.batch.begin(devices.len()).await;

        let orchestrator = Arc::clone(self);
        let batch = Arc::clone(&self.batch);
        let handle = tokio::spawn(async move {
            orchestrator.run_batch(devices, cap, Some(batch)).await;
        });

        if let Some(previous) = manual_run.replace(handle) {
            // previous batch already finished (in_progress was false)
            previous.abort();
        }

        self.batch.status().await
    }

    /// Cancel any in-flight manual batch. Used at shutdown.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.manual_run.lock().await.take() {
            handle.abort();
            debug!("manual fleet check cancelled");
        }
        self.batch.finish().await;
    }
}
