//! Single-flight sync job registry.
//!
//! One slot, owned by the engine and shared as `Arc`, accessed only through
//! `try_start` / `snapshot` / `request_cancel` — never as ambient global
//! state. The running job's [`JobHandle`] is the only writer of stage and
//! progress; pollers take cheap read snapshots. A terminal state stays
//! observable for the retention window and then lazily resets to idle at the
//! next snapshot.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("a sync job is already running")]
    AlreadyRunning,
    #[error("no sync job is running")]
    NotRunning,
}

/// Lifecycle: `idle → running → {completed | error}`, with
/// `running → cancelling → idle` for cancelled jobs. `idle` doubles as the
/// terminal-expired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Idle,
    Running,
    Cancelling,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobProgress {
    pub current: usize,
    pub total: usize,
    pub stage_label: String,
}

/// Per-storefront slice of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct StorefrontSummary {
    pub storefront: String,
    pub status: String,
    pub seen: usize,
    pub synced: usize,
    pub errors: usize,
    pub error_message: Option<String>,
}

/// Terminal result of a sync job.
///
/// `total == synced + errors` always holds; `errors` folds in write failures
/// and offers skipped for a missing vendor code, which the dedicated
/// counters break out again for callers that care about the distinction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub synced: usize,
    pub errors: usize,
    pub missing_vendor_code: usize,
    pub unmatched_offers: usize,
    pub failed_facet_batches: usize,
    pub elapsed_ms: u64,
    pub storefronts: Vec<StorefrontSummary>,
}

/// Point-in-time view of the job slot, safe to hand to any poller.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub stage: JobStage,
    pub progress: JobProgress,
    pub result: Option<SyncSummary>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct Slot {
    stage: JobStage,
    progress: JobProgress,
    result: Option<SyncSummary>,
    error: Option<String>,
    terminal_at: Option<Instant>,
    cancel: CancellationToken,
}

impl Slot {
    fn idle() -> Self {
        Self {
            stage: JobStage::Idle,
            progress: JobProgress::default(),
            result: None,
            error: None,
            terminal_at: None,
            cancel: CancellationToken::new(),
        }
    }

    fn expire_if_due(&mut self, retention: Duration) {
        let due = matches!(self.stage, JobStage::Completed | JobStage::Error)
            && self
                .terminal_at
                .is_some_and(|at| at.elapsed() >= retention);
        if due {
            *self = Slot::idle();
        }
    }
}

/// The one-slot job registry.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RwLock<Slot>>,
    retention: Duration,
}

impl JobRegistry {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Slot::idle())),
            retention,
        }
    }

    /// Claims the slot for a new job. Succeeds only from `idle` (including a
    /// terminal state past its retention window); a trigger while a job is
    /// running or its result is still observable is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::AlreadyRunning`] when the slot is taken.
    pub fn try_start(&self) -> Result<JobHandle, JobError> {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        slot.expire_if_due(self.retention);
        if slot.stage != JobStage::Idle {
            return Err(JobError::AlreadyRunning);
        }

        *slot = Slot::idle();
        slot.stage = JobStage::Running;
        let cancel = slot.cancel.clone();
        Ok(JobHandle {
            inner: Arc::clone(&self.inner),
            cancel,
        })
    }

    /// Current state of the slot, expiring a stale terminal state first.
    #[must_use]
    pub fn snapshot(&self) -> JobSnapshot {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        slot.expire_if_due(self.retention);
        JobSnapshot {
            stage: slot.stage,
            progress: slot.progress.clone(),
            result: slot.result.clone(),
            error: slot.error.clone(),
        }
    }

    /// Asks the running job to stop. The job observes the tripped token
    /// between pages and batches and winds down to `idle`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::NotRunning`] unless a job is currently `running`.
    pub fn request_cancel(&self) -> Result<(), JobError> {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        if slot.stage != JobStage::Running {
            return Err(JobError::NotRunning);
        }
        slot.stage = JobStage::Cancelling;
        slot.cancel.cancel();
        Ok(())
    }
}

/// Write side of the slot, owned by the running job's task. Single-writer by
/// construction: the registry hands out at most one live handle.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<RwLock<Slot>>,
    cancel: CancellationToken,
}

impl JobHandle {
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn set_stage(&self, label: &str, current: usize, total: usize) {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        slot.progress = JobProgress {
            current,
            total,
            stage_label: label.to_owned(),
        };
    }

    pub fn advance(&self, current: usize) {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        slot.progress.current = current;
    }

    pub fn complete(self, summary: SyncSummary) {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        slot.stage = JobStage::Completed;
        slot.result = Some(summary);
        slot.terminal_at = Some(Instant::now());
    }

    pub fn fail(self, message: String) {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        slot.stage = JobStage::Error;
        slot.error = Some(message);
        slot.terminal_at = Some(Instant::now());
    }

    /// Completes the `cancelling → idle` transition once the job has wound
    /// down.
    pub fn finish_cancelled(self) {
        let mut slot = self.inner.write().expect("job slot lock poisoned");
        *slot = Slot::idle();
    }
}
