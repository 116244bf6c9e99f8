//! Background polling of model-training jobs.
//!
//! [`TrainingMonitor::spawn`] starts a task that refreshes the job list on a
//! fixed interval and publishes snapshots on a `watch` channel. The task is
//! tied to the returned [`TrainingMonitorHandle`]: dropping the handle (the
//! owning view going away) or calling `shutdown` stops it, and nothing is
//! published afterwards.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::backend::VersioningBackend;
use crate::models::TrainingJob;

/// The latest known state of the training panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSnapshot {
    pub jobs: Vec<TrainingJob>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub polls: u64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
}

impl TrainingSnapshot {
    pub fn active_jobs(&self) -> impl Iterator<Item = &TrainingJob> {
        self.jobs.iter().filter(|j| !j.status.is_terminal())
    }
}

pub struct TrainingMonitor;

impl TrainingMonitor {
    pub fn spawn(backend: Arc<dyn VersioningBackend>, interval: Duration) -> TrainingMonitorHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(TrainingSnapshot::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(backend, interval, snapshot_tx, stop_rx));
        info!(interval_secs = interval.as_secs(), "training monitor started");
        TrainingMonitorHandle {
            snapshots: snapshot_rx,
            stop: stop_tx,
            task: Some(task),
        }
    }
}

async fn run(
    backend: Arc<dyn VersioningBackend>,
    interval: Duration,
    snapshots: watch::Sender<TrainingSnapshot>,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let result = backend.training_jobs().await;
        if *stop.borrow() {
            debug!("training monitor stopped mid-poll, dropping result");
            break;
        }

        snapshots.send_modify(|snap| {
            snap.polls += 1;
            match result {
                Ok(jobs) => {
                    debug!(jobs = jobs.len(), "training jobs refreshed");
                    snap.jobs = jobs;
                    snap.fetched_at = Some(Utc::now());
                    snap.consecutive_errors = 0;
                    snap.last_error = None;
                }
                Err(e) => {
                    snap.consecutive_errors += 1;
                    warn!(
                        kind = e.kind(),
                        error = %e,
                        consecutive_errors = snap.consecutive_errors,
                        "training job refresh failed"
                    );
                    snap.last_error = Some(e.to_string());
                }
            }
        });
    }
    info!("training monitor stopped");
}

/// Owner of the polling task.
pub struct TrainingMonitorHandle {
    snapshots: watch::Receiver<TrainingSnapshot>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TrainingMonitorHandle {
    /// A receiver that wakes on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<TrainingSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> TrainingSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TrainingMonitorHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
