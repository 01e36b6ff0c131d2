//! Bulk screening job lifecycle.
//!
//! One [`ScreeningStateMachine`] exists per job posting. It owns the
//! active-or-most-recent [`ScreeningJob`] and enforces the transition
//! table below. Commands (start/pause/reset) are guarded here; pushed
//! progress and snapshots are folded in by the reconciler.
//!
//! ```text
//! not_started ──start──▶ in_progress ──progress(completed)──▶ completed
//!      ▲                  │    ▲      ──progress(failed)─────▶ failed
//!      │                pause start                              │
//!      │                  ▼    │                                 │
//!      └──────reset────── paused ◀──────────── start ────────────┘
//! ```
//!
//! Each command carries an explicit [`Confirmation`] mode so that the
//! optimistic/confirmed asymmetry lives in one table instead of at call
//! sites.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Status constants (wire values)
// ---------------------------------------------------------------------------

pub const STATUS_NOT_STARTED: &str = "not_started";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_PAUSED: &str = "paused";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

/// All valid screening status strings.
pub const VALID_STATUSES: &[&str] = &[
    STATUS_NOT_STARTED,
    STATUS_IN_PROGRESS,
    STATUS_PAUSED,
    STATUS_COMPLETED,
    STATUS_FAILED,
];

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a screening run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    #[default]
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl ScreeningStatus {
    /// Return the wire string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => STATUS_NOT_STARTED,
            Self::InProgress => STATUS_IN_PROGRESS,
            Self::Paused => STATUS_PAUSED,
            Self::Completed => STATUS_COMPLETED,
            Self::Failed => STATUS_FAILED,
        }
    }

    /// Parse from a string, returning an error for unknown statuses.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            STATUS_NOT_STARTED => Ok(Self::NotStarted),
            STATUS_IN_PROGRESS => Ok(Self::InProgress),
            STATUS_PAUSED => Ok(Self::Paused),
            STATUS_COMPLETED => Ok(Self::Completed),
            STATUS_FAILED => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown screening status: '{other}'. Valid statuses: {}",
                VALID_STATUSES.join(", ")
            ))),
        }
    }

    /// `completed` and `failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// When a command's effect is applied to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Applied before the command round-trip; rolled back if the call fails.
    Optimistic,
    /// Applied once the command API accepts the request.
    OnResponse,
    /// Applied only when the server pushes a confirming event.
    OnEvent,
}

/// User-issued commands against a screening run or its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreeningCommand {
    Start,
    Pause,
    Reset,
    Advance,
}

impl ScreeningCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Reset => "reset",
            Self::Advance => "advance",
        }
    }

    /// The transition table's confirmation column.
    pub fn confirmation(&self) -> Confirmation {
        match self {
            Self::Start => Confirmation::Optimistic,
            Self::Pause => Confirmation::OnEvent,
            Self::Reset | Self::Advance => Confirmation::OnResponse,
        }
    }

    /// Statuses from which the command may be issued.
    pub fn allowed_from(&self) -> &'static [ScreeningStatus] {
        use ScreeningStatus::*;
        match self {
            Self::Start => &[NotStarted, Paused, Failed],
            Self::Pause => &[InProgress],
            Self::Reset => &[Paused, Failed, Completed],
            Self::Advance => &[NotStarted, InProgress, Paused, Completed, Failed],
        }
    }
}

/// How a `start` relates to the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartKind {
    /// No previous run exists.
    Fresh,
    /// Continues a paused run; progress and milestones carry over.
    Resume,
    /// Re-runs after a failure; treated as a new run.
    Restart,
}

// ---------------------------------------------------------------------------
// ScreeningJob
// ---------------------------------------------------------------------------

/// One bulk-screening run for one job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningJob {
    pub job_posting_id: DbId,
    pub status: ScreeningStatus,
    pub total_candidates: u32,
    pub screened_count: u32,
    /// Completion percentage (0-100).
    pub percentage: f64,
    pub error: Option<String>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    /// A pause command was sent and its confirming event has not arrived.
    pub pause_requested: bool,
}

impl ScreeningJob {
    /// Placeholder view for a posting with no run.
    pub fn not_started(job_posting_id: DbId) -> Self {
        Self {
            job_posting_id,
            status: ScreeningStatus::NotStarted,
            total_candidates: 0,
            screened_count: 0,
            percentage: 0.0,
            error: None,
            started_at: None,
            finished_at: None,
            pause_requested: false,
        }
    }

    /// True while the running indicator should be shown.
    pub fn is_running(&self) -> bool {
        self.status == ScreeningStatus::InProgress
    }
}

/// Progress fields carried by a pushed event or a polled snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub status: Option<ScreeningStatus>,
    pub total: Option<u32>,
    pub screened: u32,
    pub percentage: f64,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Authoritative lifecycle of the screening run for one job posting.
#[derive(Debug, Clone)]
pub struct ScreeningStateMachine {
    job_posting_id: DbId,
    job: Option<ScreeningJob>,
}

impl ScreeningStateMachine {
    pub fn new(job_posting_id: DbId) -> Self {
        Self {
            job_posting_id,
            job: None,
        }
    }

    pub fn job_posting_id(&self) -> DbId {
        self.job_posting_id
    }

    pub fn status(&self) -> ScreeningStatus {
        self.job
            .as_ref()
            .map(|j| j.status)
            .unwrap_or(ScreeningStatus::NotStarted)
    }

    pub fn job(&self) -> Option<&ScreeningJob> {
        self.job.as_ref()
    }

    /// The current run, or a `not_started` placeholder.
    pub fn current(&self) -> ScreeningJob {
        self.job
            .clone()
            .unwrap_or_else(|| ScreeningJob::not_started(self.job_posting_id))
    }

    /// Capture state before an optimistic transition.
    pub fn snapshot(&self) -> Option<ScreeningJob> {
        self.job.clone()
    }

    /// Undo an optimistic transition whose command failed.
    pub fn restore(&mut self, job: Option<ScreeningJob>) {
        self.job = job;
    }

    /// Check a command against the transition table without mutating.
    pub fn guard(&self, command: ScreeningCommand) -> Result<(), CoreError> {
        let status = self.status();
        if command.allowed_from().contains(&status) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                action: command.as_str(),
                status: status.as_str(),
            })
        }
    }

    /// Optimistically move to `in_progress`.
    pub fn start(&mut self, now: Timestamp) -> Result<StartKind, CoreError> {
        self.guard(ScreeningCommand::Start)?;
        let kind = match self.status() {
            ScreeningStatus::Paused => StartKind::Resume,
            ScreeningStatus::Failed => StartKind::Restart,
            _ => StartKind::Fresh,
        };

        let job_posting_id = self.job_posting_id;
        let job = self
            .job
            .get_or_insert_with(|| ScreeningJob::not_started(job_posting_id));
        if kind != StartKind::Resume {
            job.screened_count = 0;
            job.percentage = 0.0;
            job.started_at = Some(now);
        }
        job.status = ScreeningStatus::InProgress;
        job.error = None;
        job.finished_at = None;
        job.pause_requested = false;
        Ok(kind)
    }

    /// Record that a pause command is about to be sent. The status does
    /// not change until [`confirm_paused`](Self::confirm_paused).
    pub fn request_pause(&mut self) -> Result<(), CoreError> {
        self.guard(ScreeningCommand::Pause)?;
        if let Some(job) = self.job.as_mut() {
            job.pause_requested = true;
        }
        Ok(())
    }

    /// Drop the "pausing" flag after a failed or unconfirmed pause.
    pub fn cancel_pause_request(&mut self) {
        if let Some(job) = self.job.as_mut() {
            job.pause_requested = false;
        }
    }

    /// Apply a pushed pause confirmation. Returns `true` if the status changed.
    pub fn confirm_paused(&mut self) -> bool {
        match self.job.as_mut() {
            Some(job) if job.status == ScreeningStatus::InProgress => {
                job.status = ScreeningStatus::Paused;
                job.pause_requested = false;
                true
            }
            _ => false,
        }
    }

    /// Apply a pushed "started" notice (possibly issued by another client).
    /// Returns `true` if the status changed.
    pub fn mark_started(&mut self, now: Timestamp) -> bool {
        if self.status() == ScreeningStatus::InProgress {
            return false;
        }
        if !ScreeningCommand::Start.allowed_from().contains(&self.status()) {
            return false;
        }
        // Same bookkeeping as a local start; the guard above cannot fail.
        self.start(now).is_ok()
    }

    /// Check whether reset is allowed given how many candidates have a stage.
    pub fn check_reset(&self, advanced: usize) -> Result<(), CoreError> {
        self.guard(ScreeningCommand::Reset)?;
        if advanced > 0 {
            return Err(CoreError::ResetBlocked { advanced });
        }
        Ok(())
    }

    /// Destroy the run. The next start creates a new one.
    pub fn reset(&mut self) {
        self.job = None;
    }

    /// Fold pushed progress into the run.
    ///
    /// Counts are updated in place. The status only changes when the
    /// payload reports `completed` or `failed`; the new terminal status is
    /// returned in that case. Without a run, non-terminal progress is
    /// ignored: only a start creates one.
    pub fn apply_progress(
        &mut self,
        update: &ProgressUpdate,
        now: Timestamp,
    ) -> Option<ScreeningStatus> {
        let terminal = update.status.filter(|s| s.is_terminal());
        if self.job.is_none() && terminal.is_none() {
            return None;
        }
        let job_posting_id = self.job_posting_id;
        let job = self.job.get_or_insert_with(|| {
            let mut job = ScreeningJob::not_started(job_posting_id);
            job.started_at = Some(now);
            job
        });

        job.screened_count = update.screened;
        job.percentage = update.percentage.clamp(0.0, 100.0);
        if let Some(total) = update.total {
            job.total_candidates = total;
        }

        match update.status {
            Some(status) if status.is_terminal() && job.status != status => {
                job.status = status;
                job.finished_at = Some(now);
                job.pause_requested = false;
                job.error = if status == ScreeningStatus::Failed {
                    update.error.clone()
                } else {
                    None
                };
                Some(status)
            }
            _ => None,
        }
    }

    /// Adopt the status reported by a polled snapshot, which is
    /// authoritative for every status.
    pub fn sync_status(&mut self, status: ScreeningStatus, error: Option<String>, now: Timestamp) {
        if status == ScreeningStatus::NotStarted {
            self.job = None;
            return;
        }
        let job_posting_id = self.job_posting_id;
        let job = self.job.get_or_insert_with(|| {
            let mut job = ScreeningJob::not_started(job_posting_id);
            job.started_at = Some(now);
            job
        });
        if job.status != status {
            if status.is_terminal() {
                job.finished_at = Some(now);
            }
            job.status = status;
        }
        if status != ScreeningStatus::InProgress {
            job.pause_requested = false;
        }
        job.error = if status == ScreeningStatus::Failed {
            error
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn progress(screened: u32, percentage: f64, status: Option<ScreeningStatus>) -> ProgressUpdate {
        ProgressUpdate {
            status,
            total: Some(100),
            screened,
            percentage,
            error: None,
        }
    }

    // --- Status parsing ---

    #[test]
    fn status_round_trips_through_str() {
        for s in VALID_STATUSES {
            assert_eq!(ScreeningStatus::from_str(s).unwrap().as_str(), *s);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = ScreeningStatus::from_str("running").unwrap_err();
        assert!(err.to_string().contains("Unknown screening status"));
    }

    // --- Confirmation table ---

    #[test]
    fn start_is_optimistic_pause_waits_for_event() {
        assert_eq!(ScreeningCommand::Start.confirmation(), Confirmation::Optimistic);
        assert_eq!(ScreeningCommand::Pause.confirmation(), Confirmation::OnEvent);
        assert_eq!(ScreeningCommand::Reset.confirmation(), Confirmation::OnResponse);
        assert_eq!(ScreeningCommand::Advance.confirmation(), Confirmation::OnResponse);
    }

    // --- Start ---

    #[test]
    fn start_from_not_started_creates_job() {
        let mut sm = ScreeningStateMachine::new(7);
        assert!(sm.job().is_none());

        let kind = sm.start(Utc::now()).unwrap();
        assert_eq!(kind, StartKind::Fresh);
        assert_eq!(sm.status(), ScreeningStatus::InProgress);
        assert!(sm.job().unwrap().started_at.is_some());
    }

    #[test]
    fn start_while_in_progress_is_rejected() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        assert_matches!(
            sm.start(Utc::now()),
            Err(CoreError::InvalidTransition { action: "start", status: "in_progress" })
        );
    }

    #[test]
    fn start_after_completed_requires_reset() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.apply_progress(&progress(100, 100.0, Some(ScreeningStatus::Completed)), Utc::now());
        assert!(sm.start(Utc::now()).is_err());
    }

    #[test]
    fn resume_keeps_progress_restart_clears_it() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.apply_progress(&progress(40, 40.0, None), Utc::now());
        sm.request_pause().unwrap();
        assert!(sm.confirm_paused());

        assert_eq!(sm.start(Utc::now()).unwrap(), StartKind::Resume);
        assert_eq!(sm.job().unwrap().screened_count, 40);

        sm.apply_progress(
            &ProgressUpdate {
                error: Some("scoring service unavailable".into()),
                ..progress(50, 50.0, Some(ScreeningStatus::Failed))
            },
            Utc::now(),
        );
        assert_eq!(sm.start(Utc::now()).unwrap(), StartKind::Restart);
        let job = sm.job().unwrap();
        assert_eq!(job.screened_count, 0);
        assert!(job.error.is_none());
    }

    #[test]
    fn restore_undoes_optimistic_start() {
        let mut sm = ScreeningStateMachine::new(7);
        let before = sm.snapshot();
        sm.start(Utc::now()).unwrap();
        sm.restore(before);
        assert_eq!(sm.status(), ScreeningStatus::NotStarted);
    }

    #[test]
    fn advance_is_not_gated_by_run_status() {
        let mut sm = ScreeningStateMachine::new(7);
        assert!(sm.guard(ScreeningCommand::Advance).is_ok());
        sm.start(Utc::now()).unwrap();
        assert!(sm.guard(ScreeningCommand::Advance).is_ok());
    }

    // --- Pause ---

    #[test]
    fn pause_does_not_change_status_until_confirmed() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.request_pause().unwrap();

        assert_eq!(sm.status(), ScreeningStatus::InProgress);
        assert!(sm.job().unwrap().pause_requested);

        assert!(sm.confirm_paused());
        assert_eq!(sm.status(), ScreeningStatus::Paused);
        assert!(!sm.job().unwrap().pause_requested);
    }

    #[test]
    fn pause_outside_in_progress_is_rejected() {
        let mut sm = ScreeningStateMachine::new(7);
        assert_matches!(sm.request_pause(), Err(CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn duplicate_pause_confirmation_is_noop() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        assert!(sm.confirm_paused());
        assert!(!sm.confirm_paused());
    }

    // --- Reset ---

    #[test]
    fn reset_forbidden_while_in_progress() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        assert_matches!(sm.check_reset(0), Err(CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn reset_forbidden_after_advancement() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.apply_progress(&progress(10, 100.0, Some(ScreeningStatus::Completed)), Utc::now());
        assert_matches!(sm.check_reset(2), Err(CoreError::ResetBlocked { advanced: 2 }));
    }

    #[test]
    fn reset_destroys_job() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.apply_progress(&progress(10, 100.0, Some(ScreeningStatus::Completed)), Utc::now());
        sm.check_reset(0).unwrap();
        sm.reset();
        assert!(sm.job().is_none());
        assert_eq!(sm.status(), ScreeningStatus::NotStarted);
    }

    // --- Progress ---

    #[test]
    fn non_terminal_progress_keeps_status() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.request_pause().unwrap();
        sm.confirm_paused();

        let changed = sm.apply_progress(
            &progress(30, 30.0, Some(ScreeningStatus::InProgress)),
            Utc::now(),
        );
        assert!(changed.is_none());
        assert_eq!(sm.status(), ScreeningStatus::Paused);
        assert_eq!(sm.job().unwrap().screened_count, 30);
    }

    #[test]
    fn completed_progress_clears_running_indicator() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        assert!(sm.job().unwrap().is_running());

        let changed = sm.apply_progress(
            &progress(100, 100.0, Some(ScreeningStatus::Completed)),
            Utc::now(),
        );
        assert_eq!(changed, Some(ScreeningStatus::Completed));
        let job = sm.job().unwrap();
        assert!(!job.is_running());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn failed_progress_records_error() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        let update = ProgressUpdate {
            error: Some("quota exceeded".into()),
            ..progress(3, 3.0, Some(ScreeningStatus::Failed))
        };
        assert_eq!(sm.apply_progress(&update, Utc::now()), Some(ScreeningStatus::Failed));
        assert_eq!(sm.job().unwrap().error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn progress_without_run_does_not_start_one() {
        let mut sm = ScreeningStateMachine::new(7);
        let changed = sm.apply_progress(&progress(5, 5.0, None), Utc::now());
        assert!(changed.is_none());
        assert!(sm.job().is_none());
        assert_eq!(sm.status(), ScreeningStatus::NotStarted);
    }

    // --- Snapshot status ---

    #[test]
    fn snapshot_status_confirms_pause() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.request_pause().unwrap();
        sm.sync_status(ScreeningStatus::Paused, None, Utc::now());
        assert_eq!(sm.status(), ScreeningStatus::Paused);
        assert!(!sm.job().unwrap().pause_requested);
    }

    #[test]
    fn snapshot_not_started_clears_job() {
        let mut sm = ScreeningStateMachine::new(7);
        sm.start(Utc::now()).unwrap();
        sm.sync_status(ScreeningStatus::NotStarted, None, Utc::now());
        assert!(sm.job().is_none());
    }

    // --- Wire format ---

    #[test]
    fn status_uses_snake_case_on_the_wire() {
        let json = serde_json::to_string(&ScreeningStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
        let parsed: ScreeningStatus = serde_json::from_str(r#""not_started""#).unwrap();
        assert_eq!(parsed, ScreeningStatus::NotStarted);
        assert_eq!(ScreeningStatus::from_str("paused").unwrap(), ScreeningStatus::Paused);
    }
}
