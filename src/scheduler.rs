//! Periodic re-invocation of the sync engine with a reentrancy guard.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::errors::SyncError;
use crate::sync_engine::{SyncEngine, SyncReport};

/// Result of asking the service to run once.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(SyncReport),
    /// The destination may have been left partially reconciled.
    Failed(SyncError),
    /// Another run was already in progress; nothing happened.
    Skipped,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Holds the running flag for as long as it lives.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// A source/destination pair and the engine that mirrors one into the other.
///
/// At most one run executes at a time no matter how many threads call
/// [`SyncService::try_run`].
pub struct SyncService {
    engine: SyncEngine,
    source: PathBuf,
    destination: PathBuf,
    running: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    last_report: Mutex<Option<SyncReport>>,
}

impl SyncService {
    pub fn new(engine: SyncEngine, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            source: source.into(),
            destination: destination.into(),
            running: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    pub fn last_report(&self) -> Option<SyncReport> {
        self.last_report.lock().clone()
    }

    /// Runs one synchronization on the calling thread unless one is already
    /// in flight. Failures are logged and returned, never propagated.
    pub fn try_run(&self) -> RunOutcome {
        let Some(_guard) = RunGuard::try_acquire(&self.running) else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            warn!(
                source = %self.source.display(),
                destination = %self.destination.display(),
                "Previous synchronization still running, skipping this tick"
            );
            return RunOutcome::Skipped;
        };

        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id);
        let _enter = span.enter();

        match self.engine.sync(&self.source, &self.destination) {
            Ok(report) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                *self.last_report.lock() = Some(report.clone());
                RunOutcome::Completed(report)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %e,
                    source = %self.source.display(),
                    destination = %self.destination.display(),
                    "Synchronization failed, destination state unknown until next run"
                );
                RunOutcome::Failed(e)
            }
        }
    }
}

/// Drives a [`SyncService`] on a fixed period.
///
/// The first tick fires immediately. Every tick hands the run to the blocking
/// pool without waiting for it, so a tick that arrives while a run is still in
/// progress hits the service's guard and is discarded.
pub struct Scheduler {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the timer loop on the current tokio runtime.
    pub fn start(service: Arc<SyncService>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
        info!(
            source = %service.source().display(),
            destination = %service.destination().display(),
            period_secs = period.as_secs_f64(),
            "Starting scheduler"
        );
        let handle = tokio::spawn(Self::tick_loop(service, period, stop_rx));
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stops ticking and waits for any run already in flight to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    async fn tick_loop(service: Arc<SyncService>, period: Duration, mut stop_rx: mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Vec<JoinHandle<RunOutcome>> = Vec::new();

        loop {
            tokio::select! {
                _ = stop_rx.recv() => break,
                _ = ticker.tick() => {
                    in_flight.retain(|handle| !handle.is_finished());
                    let service = service.clone();
                    in_flight.push(tokio::task::spawn_blocking(move || service.try_run()));
                }
            }
        }

        for handle in in_flight {
            if let Err(e) = handle.await {
                error!(error = %e, "Synchronization task panicked");
            }
        }
    }
}
