//! Background refresh loop for the repository mirror.
//!
//! The scheduler owns at most one tokio task. Each cycle runs a full
//! fetch/compare/pull and only then arms the next timer, so two cycles can
//! never overlap and consecutive cycles are at least one interval apart.
//!
//! ```text
//!            start()                       timer fires
//!   Idle ────────────▶ cycle ─▶ Scheduled ─────────────▶ cycle ─┐
//!    ▲                              ▲                           │
//!    │ stop()                       └───────────────────────────┘
//!    └──────────────── any state
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::mirror::{RepositoryMirror, SyncReport};

/// What the scheduler keeps fresh.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub target_dir: PathBuf,
    pub git_ref: String,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodic synchronize driver with explicit `start` / `stop`.
pub struct UpdateScheduler {
    mirror: Arc<dyn RepositoryMirror>,
    target: SyncTarget,
    interval: Duration,
    running: Option<Running>,
}

impl UpdateScheduler {
    pub fn new(mirror: Arc<dyn RepositoryMirror>, target: SyncTarget, interval: Duration) -> Self {
        Self {
            mirror,
            target,
            interval,
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` while a cycle or timer is pending.
    pub fn is_scheduled(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Run one cycle immediately, then keep re-arming the timer.
    ///
    /// Calling `start` on an already running scheduler is a no-op.
    pub fn start(&mut self) {
        if self.is_scheduled() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mirror = self.mirror.clone();
        let target = self.target.clone();
        let interval = self.interval;

        tracing::info!(
            interval_secs = interval.as_secs(),
            target_dir = %target.target_dir.display(),
            "update scheduler started"
        );

        let task = tokio::spawn(async move {
            loop {
                run_cycle(mirror.as_ref(), &target).await;

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("update scheduler loop exited");
        });

        self.running = Some(Running { shutdown, task });
    }

    /// Cancel the pending timer and return to idle.
    ///
    /// A cycle already in flight gets `grace` to finish; after that the task
    /// is aborted, which kills any git child process it spawned.
    pub async fn stop(&mut self, grace: Duration) {
        let Some(Running { shutdown, mut task }) = self.running.take() else {
            return;
        };

        let _ = shutdown.send(true);
        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => tracing::info!("update scheduler stopped"),
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "sync cycle still running at shutdown; abandoning it"
                );
                task.abort();
            }
        }
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.task.abort();
        }
    }
}

/// One update cycle: fetch, compare, pull if behind. Never fails.
pub async fn run_cycle(mirror: &dyn RepositoryMirror, target: &SyncTarget) -> SyncReport {
    let report = mirror
        .synchronize(&target.target_dir, &target.git_ref)
        .await;
    if report.updated {
        tracing::info!(
            behind_count = report.behind_count,
            git_ref = %target.git_ref,
            "pulled new commits"
        );
    } else {
        tracing::debug!(git_ref = %target.git_ref, "no update applied");
    }
    report
}
