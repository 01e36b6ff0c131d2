//! Progress reconciliation for one job posting's screening run.
//!
//! Pushed events and polled snapshots both describe the same run and may
//! arrive late, twice, or out of order. [`ProgressReconciler`] folds them
//! into the [`ScreeningStateMachine`] in arrival order, but only lets a
//! payload move the progress counters forward:
//!
//! - **count group** (screened / percentage): applied only when the
//!   payload's [`ProgressKey`] is strictly ahead of the last applied one.
//! - **status group**: a pushed event may only introduce a terminal status;
//!   a snapshot is authoritative for status unless its key is behind.
//!
//! Milestone notices fire at most once per threshold per run, and a
//! completed run stays visible for a short display window before the
//! indicator collapses.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::screening::{
    ProgressUpdate, ScreeningCommand, ScreeningJob, ScreeningStateMachine, ScreeningStatus,
    StartKind,
};
use crate::types::DbId;

/// Progress percentages that trigger a one-time notice.
pub const MILESTONES: [u8; 3] = [25, 50, 75];

/// How long a completed run stays on screen before collapsing.
pub const DEFAULT_COMPLETION_DISPLAY_WINDOW: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Ordering key for the count group.
///
/// Compared lexicographically: an explicit server sequence wins, then the
/// screened count (monotonic within a run), then the percentage.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ProgressKey {
    pub sequence: u64,
    pub screened: u32,
    pub percentage: f64,
}

impl ProgressKey {
    pub fn new(sequence: Option<u64>, screened: u32, percentage: f64) -> Self {
        Self {
            sequence: sequence.unwrap_or(0),
            screened,
            percentage,
        }
    }
}

/// Screening lifecycle signals decoded from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreeningSignal {
    /// A run was started (by this or another client).
    Started { job_title: Option<String> },
    /// Progress counters, optionally carrying a terminal status.
    Progress {
        sequence: Option<u64>,
        update: ProgressUpdate,
    },
    /// The server confirmed a pause.
    Paused { job_title: Option<String> },
}

/// Result of polling the progress endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub status: ScreeningStatus,
    pub total: u32,
    pub screened: u32,
    pub percentage: f64,
    pub error: Option<String>,
    pub sequence: Option<u64>,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// What a single apply call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciled {
    /// False when the payload was a duplicate or stale and was discarded.
    pub applied: bool,
    /// New status, if the apply changed it.
    pub status_changed: Option<ScreeningStatus>,
    /// Milestones crossed for the first time in this run.
    pub milestones: Vec<u8>,
    /// When the progress indicator should collapse, set on completion.
    pub collapse_at: Option<Instant>,
}

impl Reconciled {
    fn discarded() -> Self {
        Self::default()
    }
}

/// Presentation state of the progress indicator.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressIndicator {
    Hidden,
    Running { percentage: f64, pausing: bool },
    Paused { percentage: f64 },
    Completed { percentage: f64 },
    Failed { error: Option<String> },
}

/// Saved reconciler state for rolling back an optimistic start.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    job: Option<ScreeningJob>,
    last_key: Option<ProgressKey>,
    fired: BTreeSet<u8>,
    completed_at: Option<Instant>,
}

// ---------------------------------------------------------------------------
// ProgressReconciler
// ---------------------------------------------------------------------------

/// Single ordered-apply point for everything that mutates a screening run.
#[derive(Debug, Clone)]
pub struct ProgressReconciler {
    machine: ScreeningStateMachine,
    last_key: Option<ProgressKey>,
    fired: BTreeSet<u8>,
    completed_at: Option<Instant>,
    display_window: Duration,
}

impl ProgressReconciler {
    pub fn new(job_posting_id: DbId) -> Self {
        Self {
            machine: ScreeningStateMachine::new(job_posting_id),
            last_key: None,
            fired: BTreeSet::new(),
            completed_at: None,
            display_window: DEFAULT_COMPLETION_DISPLAY_WINDOW,
        }
    }

    pub fn with_display_window(mut self, window: Duration) -> Self {
        self.display_window = window;
        self
    }

    pub fn machine(&self) -> &ScreeningStateMachine {
        &self.machine
    }

    pub fn status(&self) -> ScreeningStatus {
        self.machine.status()
    }

    /// Merged view of the run.
    pub fn current(&self) -> ScreeningJob {
        self.machine.current()
    }

    /// Milestones already announced in the current run.
    pub fn fired_milestones(&self) -> impl Iterator<Item = u8> + '_ {
        self.fired.iter().copied()
    }

    // ---- push / poll ----

    /// Apply one decoded push signal.
    pub fn apply_event(&mut self, signal: &ScreeningSignal, now: Instant) -> Reconciled {
        match signal {
            ScreeningSignal::Started { .. } => {
                let prior = self.machine.status();
                if !self.machine.mark_started(Utc::now()) {
                    return Reconciled::discarded();
                }
                if prior != ScreeningStatus::Paused {
                    self.begin_run();
                }
                Reconciled {
                    applied: true,
                    status_changed: Some(ScreeningStatus::InProgress),
                    ..Default::default()
                }
            }
            ScreeningSignal::Paused { .. } => {
                if !self.machine.confirm_paused() {
                    return Reconciled::discarded();
                }
                Reconciled {
                    applied: true,
                    status_changed: Some(ScreeningStatus::Paused),
                    ..Default::default()
                }
            }
            ScreeningSignal::Progress { sequence, update } => {
                self.apply_progress_event(*sequence, update, now)
            }
        }
    }

    fn apply_progress_event(
        &mut self,
        sequence: Option<u64>,
        update: &ProgressUpdate,
        now: Instant,
    ) -> Reconciled {
        // Without a run the payload belongs to one that was reset or was
        // never seen starting; a start signal or snapshot opens the run.
        if self.machine.status() == ScreeningStatus::NotStarted {
            return Reconciled::discarded();
        }

        let key = ProgressKey::new(sequence, update.screened, update.percentage);
        let counts_ahead = self.last_key.map_or(true, |last| key > last);
        let new_terminal = update
            .status
            .filter(|s| s.is_terminal() && *s != self.machine.status());

        if !counts_ahead && new_terminal.is_none() {
            return Reconciled::discarded();
        }

        let effective = if counts_ahead {
            self.last_key = Some(key);
            update.clone()
        } else {
            // Stale counters: keep what we show, take only the terminal status.
            let job = self.machine.current();
            ProgressUpdate {
                status: new_terminal,
                total: Some(job.total_candidates),
                screened: job.screened_count,
                percentage: job.percentage,
                error: update.error.clone(),
            }
        };

        let status_changed = self.machine.apply_progress(&effective, Utc::now());
        self.finish_apply(status_changed, now)
    }

    /// Apply a polled snapshot. Stale snapshots (key behind the last
    /// applied one) are discarded whole.
    ///
    /// A run is never reset while in progress, so a `not_started` snapshot
    /// seen then predates the local start. A snapshot whose key is not
    /// ahead cannot move a terminal run back to a live status.
    pub fn apply_snapshot(&mut self, snapshot: &ProgressSnapshot, now: Instant) -> Reconciled {
        let key = ProgressKey::new(snapshot.sequence, snapshot.screened, snapshot.percentage);
        let prior = self.machine.status();

        if snapshot.status == ScreeningStatus::NotStarted {
            if matches!(prior, ScreeningStatus::NotStarted | ScreeningStatus::InProgress) {
                return Reconciled::discarded();
            }
            self.machine
                .sync_status(ScreeningStatus::NotStarted, None, Utc::now());
            self.begin_run();
            return Reconciled {
                applied: true,
                status_changed: Some(ScreeningStatus::NotStarted),
                ..Default::default()
            };
        }

        if self.last_key.is_some_and(|last| key < last) {
            return Reconciled::discarded();
        }
        let ahead = self.last_key.map_or(true, |last| key > last);
        if !ahead && prior.is_terminal() && !snapshot.status.is_terminal() {
            return Reconciled::discarded();
        }
        self.last_key = Some(key);

        let counts = ProgressUpdate {
            status: None,
            total: Some(snapshot.total),
            screened: snapshot.screened,
            percentage: snapshot.percentage,
            error: None,
        };
        let now_ts = Utc::now();
        self.machine
            .sync_status(snapshot.status, snapshot.error.clone(), now_ts);
        self.machine.apply_progress(&counts, now_ts);

        let after = self.machine.status();
        let status_changed = (after != prior).then_some(after);
        self.finish_apply(status_changed, now)
    }

    /// Milestones and completion bookkeeping shared by events and snapshots.
    fn finish_apply(&mut self, status_changed: Option<ScreeningStatus>, now: Instant) -> Reconciled {
        let job = self.machine.current();
        let mut result = Reconciled {
            applied: true,
            status_changed,
            ..Default::default()
        };

        if !job.status.is_terminal() {
            for milestone in MILESTONES {
                if job.percentage >= f64::from(milestone) && self.fired.insert(milestone) {
                    result.milestones.push(milestone);
                }
            }
        }

        if status_changed == Some(ScreeningStatus::Completed) {
            self.completed_at = Some(now);
            result.collapse_at = Some(now + self.display_window);
        }
        result
    }

    // ---- commands ----

    /// Check a command against the transition table.
    pub fn guard(&self, command: ScreeningCommand) -> Result<(), CoreError> {
        self.machine.guard(command)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            job: self.machine.snapshot(),
            last_key: self.last_key,
            fired: self.fired.clone(),
            completed_at: self.completed_at,
        }
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.machine.restore(checkpoint.job);
        self.last_key = checkpoint.last_key;
        self.fired = checkpoint.fired;
        self.completed_at = checkpoint.completed_at;
    }

    /// Optimistic start. A fresh or restarted run clears ordering guards
    /// and milestones; a resumed run keeps them.
    pub fn start(&mut self) -> Result<StartKind, CoreError> {
        let kind = self.machine.start(Utc::now())?;
        if kind != StartKind::Resume {
            self.begin_run();
        }
        Ok(kind)
    }

    pub fn request_pause(&mut self) -> Result<(), CoreError> {
        self.machine.request_pause()
    }

    pub fn cancel_pause_request(&mut self) {
        self.machine.cancel_pause_request();
    }

    pub fn check_reset(&self, advanced: usize) -> Result<(), CoreError> {
        self.machine.check_reset(advanced)
    }

    /// Destroy the run and forget everything tied to it.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.begin_run();
    }

    fn begin_run(&mut self) {
        self.last_key = None;
        self.fired.clear();
        self.completed_at = None;
    }

    // ---- presentation ----

    /// True once a completed run has been on screen for the display window.
    pub fn collapse_due(&self, now: Instant) -> bool {
        self.machine.status() == ScreeningStatus::Completed
            && self
                .completed_at
                .is_some_and(|at| now >= at + self.display_window)
    }

    pub fn indicator(&self, now: Instant) -> ProgressIndicator {
        let job = self.machine.current();
        match job.status {
            ScreeningStatus::NotStarted => ProgressIndicator::Hidden,
            ScreeningStatus::InProgress => ProgressIndicator::Running {
                percentage: job.percentage,
                pausing: job.pause_requested,
            },
            ScreeningStatus::Paused => ProgressIndicator::Paused {
                percentage: job.percentage,
            },
            ScreeningStatus::Completed if self.collapse_due(now) => ProgressIndicator::Hidden,
            ScreeningStatus::Completed => ProgressIndicator::Completed {
                percentage: job.percentage,
            },
            ScreeningStatus::Failed => ProgressIndicator::Failed { error: job.error },
        }
    }
}
