//! Background monitoring loop.
//!
//! Runs a cycle, sleeps for the configured interval, and repeats until
//! stopped. The stop signal is observed between cycles only: a cycle in
//! progress always completes, while the sleep is cut short.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::orchestrator::Orchestrator;
use crate::report::CycleReport;

#[derive(Default)]
struct Progress {
    cycles: AtomicUsize,
    last: Mutex<Option<CycleReport>>,
}

/// Handle to a running monitor loop. Dropping the handle also stops the
/// loop after its current cycle.
pub struct Monitor {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
    progress: Arc<Progress>,
}

impl Monitor {
    /// Spawn the loop on the current tokio runtime.
    pub fn start(orchestrator: Arc<Orchestrator>) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let progress = Arc::new(Progress::default());
        let handle = tokio::spawn(run(orchestrator, stop_rx, Arc::clone(&progress)));
        info!("monitoring started");
        Self {
            stop,
            handle,
            progress,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cycles_completed(&self) -> usize {
        self.progress.cycles.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.progress
            .last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Signal the loop and wait for it to finish. Returns the number of
    /// cycles that ran.
    pub async fn stop(self) -> usize {
        self.stop.send_replace(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "monitor task ended abnormally");
        }
        let cycles = self.progress.cycles.load(Ordering::SeqCst);
        info!(cycles, "monitoring stopped");
        cycles
    }
}

async fn run(orchestrator: Arc<Orchestrator>, mut stop: watch::Receiver<bool>, progress: Arc<Progress>) {
    let interval = orchestrator.config().cycle_interval;
    loop {
        if *stop.borrow_and_update() {
            break;
        }

        match orchestrator.run_cycle().await {
            Ok(report) => {
                *progress.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(report);
            }
            Err(e) => error!(error = %e, "cycle failed"),
        }
        progress.cycles.fetch_add(1, Ordering::SeqCst);

        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
