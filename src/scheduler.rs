//! Recurring task scheduler
//!
//! Runs named tasks on a fixed cadence. Each task is built from a factory
//! closure so every iteration gets a fresh future; the loop subtracts the
//! run's own duration from the interval so long checks don't drift the
//! cadence. A failing iteration is logged and retried after a short
//! back-off instead of killing the loop.
//!
//! Cancellation is cooperative: the flag is checked at loop boundaries,
//! never mid-iteration, so an in-flight run always finishes before the
//! loop winds down.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::settings::clamp_interval;

/// Wait after a failed iteration before trying again.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(10);

struct ScheduledTask {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

/// Registry of named recurring tasks.
///
/// Explicitly constructed and owned by the composition root; dropping the
/// scheduler without calling [`Scheduler::stop`] leaves loops running
/// until their next boundary check fails on the closed channel.
#[derive(Default)]
pub struct Scheduler {
    tasks: Mutex<HashMap<String, ScheduledTask>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a recurring task.
    ///
    /// Scheduling under an existing `task_id` cancels the previous loop
    /// first, so at most one loop per name is ever live.
    pub async fn schedule<F, Fut>(&self, task_id: &str, interval: Duration, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;

        // cancel the previous loop before its replacement exists, so a
        // slow reschedule never has two loops for one name in flight
        if let Some(previous) = tasks.remove(task_id) {
            debug!("rescheduling task '{task_id}', cancelling previous loop");
            let _ = previous.cancel.send(true);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);

        let id = task_id.to_string();
        let handle = tokio::spawn(run_loop(id, interval, factory, cancel_rx));

        tasks.insert(
            task_id.to_string(),
            ScheduledTask {
                handle,
                cancel: cancel_tx,
            },
        );

        info!("scheduled task '{task_id}' every {interval:?}");
    }

    /// Interval given in minutes, clamped to the supported range.
    pub async fn schedule_minutes<F, Fut>(&self, task_id: &str, minutes: u32, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let minutes = clamp_interval(minutes);
        self.schedule(task_id, Duration::from_secs(u64::from(minutes) * 60), factory)
            .await;
    }

    pub async fn is_scheduled(&self, task_id: &str) -> bool {
        self.tasks.lock().await.contains_key(task_id)
    }

    /// Cancel one task. Returns whether it existed. The loop finishes its
    /// in-flight iteration before exiting.
    pub async fn cancel(&self, task_id: &str) -> bool {
        match self.tasks.lock().await.remove(task_id) {
            Some(task) => {
                let _ = task.cancel.send(true);
                debug!("cancelled task '{task_id}'");
                true
            }
            None => false,
        }
    }

    /// Cancel every task and wait for the loops to wind down.
    pub async fn stop(&self) {
        let tasks: Vec<(String, ScheduledTask)> = self.tasks.lock().await.drain().collect();

        for (_, task) in &tasks {
            let _ = task.cancel.send(true);
        }

        for (task_id, task) in tasks {
            if let Err(e) = task.handle.await {
                error!("task '{task_id}' did not shut down cleanly: {e}");
            }
        }

        info!("scheduler stopped");
    }
}

async fn run_loop<F, Fut>(
    task_id: String,
    interval: Duration,
    factory: F,
    mut cancel: watch::Receiver<bool>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    loop {
        if *cancel.borrow() {
            break;
        }

        let started = Instant::now();
        let wait = match factory().await {
            Ok(()) => {
                // keep the cadence: a run eating into the interval shortens
                // the following sleep, down to zero
                interval.saturating_sub(started.elapsed())
            }
            Err(e) => {
                error!("task '{task_id}' failed: {e:#}, retrying in {ERROR_BACKOFF:?}");
                ERROR_BACKOFF
            }
        };

        if sleep_or_cancel(wait, &mut cancel).await {
            break;
        }
    }

    debug!("task '{task_id}' loop exited");
}

/// Sleep for `duration`, waking early on cancellation. Returns whether
/// the loop should exit.
async fn sleep_or_cancel(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = cancel.changed() => match changed {
            Ok(()) => *cancel.borrow(),
            // sender gone means the scheduler itself was dropped
            Err(_) => true,
        },
    }
}
