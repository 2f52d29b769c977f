//! Fleet batch bookkeeping
//!
//! One `BatchState` exists per running service, owned by the composition
//! root and handed to the orchestrator - there is no module-level global.
//! Many checker tasks record into it concurrently, so every
//! read-modify-write happens under one mutex.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::AvailabilityCheckResult;

/// Progress of the current (or most recent) fleet batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatus {
    pub in_progress: bool,
    pub completed: usize,
    pub total: usize,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct BatchInner {
    status: BatchStatus,
    /// Most recent result per device for the current batch only.
    results: std::collections::HashMap<i64, AvailabilityCheckResult>,
}

/// Shared, mutex-guarded batch state.
#[derive(Default)]
pub struct BatchState {
    inner: Mutex<BatchInner>,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new batch of `total` devices. Clears the partial
    /// results of any previous run.
    pub async fn begin(&self, total: usize) {
        let mut inner = self.inner.lock().await;
        inner.results.clear();
        inner.status = BatchStatus {
            in_progress: true,
            completed: 0,
            total,
            started_at: Some(Utc::now()),
        };
    }

    /// Record one finished check. Errored checks count as completed too.
    pub async fn record(&self, result: AvailabilityCheckResult) {
        let mut inner = self.inner.lock().await;
        inner.results.insert(result.device_id, result);
        if inner.status.completed < inner.status.total {
            inner.status.completed += 1;
        }
    }

    /// Mark the batch as done; partial results stay readable until the
    /// next `begin`.
    pub async fn finish(&self) {
        self.inner.lock().await.status.in_progress = false;
    }

    pub async fn status(&self) -> BatchStatus {
        self.inner.lock().await.status.clone()
    }

    /// Results recorded so far by the current batch, in device-id order.
    pub async fn partial_results(&self) -> Vec<AvailabilityCheckResult> {
        let inner = self.inner.lock().await;
        let mut results: Vec<AvailabilityCheckResult> = inner.results.values().cloned().collect();
        results.sort_by_key(|r| r.device_id);
        results
    }
}
