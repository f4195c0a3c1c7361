// src/pipeline/scheduler.rs

//! Independent polling timelines, one per source.
//!
//! Every source runs in its own task: poll, sleep for whatever delay the
//! backoff chose, repeat. A slow or failing source never delays another.
//! `force_refresh` adds one extra poll per source without touching the
//! pending natural timers, and `shutdown` cancels every timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::FeedConfig;
use crate::services::SourceAdapter;

use super::coordinator::{Coordinator, SourceSlot};

/// Drives the coordinator's sources on their own schedules.
pub struct Scheduler {
    coordinator: Arc<Coordinator>,
    shutdown_tx: watch::Sender<bool>,
    shut_down: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            coordinator,
            shutdown_tx,
            shut_down: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Register a source and start polling it: once now, then every
    /// `base_interval` while healthy, or on the backoff delay after failures.
    pub async fn schedule(
        &self,
        feed: FeedConfig,
        adapter: Arc<dyn SourceAdapter>,
        base_interval: Duration,
    ) -> Result<()> {
        self.ensure_running()?;
        let slot = self.coordinator.register(feed, adapter, base_interval).await;

        let coordinator = self.coordinator.clone();
        let shutdown = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_timeline(coordinator, slot, shutdown));
        self.tasks.lock().await.push(handle);
        Ok(())
    }

    /// Poll every registered source once more, right now.
    ///
    /// In-flight polls are not cancelled, and natural timers keep their
    /// deadlines; the extra poll still records success or failure against
    /// the shared backoff state.
    pub async fn force_refresh(&self) -> Result<()> {
        self.ensure_running()?;
        let sources = self.coordinator.sources().await;
        log::info!("Forced refresh of {} source(s)", sources.len());

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        for slot in sources {
            let coordinator = self.coordinator.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = coordinator.poll(&slot) => {}
                    _ = shutdown.wait_for(|stop| *stop) => {
                        log::debug!("[{}] forced poll abandoned at shutdown", slot.name());
                    }
                }
            }));
        }
        Ok(())
    }

    /// Cancel all pending timers and wait for the tasks to stop.
    ///
    /// A fetch still in flight is abandoned; state is only mutated after a
    /// fetch has fully completed, so nothing is left half-applied.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("Scheduler shutting down");
        self.shutdown_tx.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                log::warn!("Polling task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(AppError::Shutdown)
        } else {
            Ok(())
        }
    }
}

/// Natural polling loop of one source.
async fn run_timeline(
    coordinator: Arc<Coordinator>,
    slot: Arc<SourceSlot>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let delay = tokio::select! {
            delay = coordinator.poll(&slot) => delay,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };
        log::debug!("[{}] next poll in {}s", slot.name(), delay.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
    log::debug!("[{}] polling stopped", slot.name());
}
