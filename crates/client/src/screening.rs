//! Per-posting screening controller.
//!
//! [`ScreeningController`] is the only thing that mutates one job
//! posting's screening run and candidate board. Pushed signals, polled
//! snapshots and user commands all go through its lock, so they are
//! applied one at a time in arrival order.
//!
//! Commands follow the confirmation column of the transition table:
//!
//! | Command | Applied                                  |
//! |---------|------------------------------------------|
//! | start   | optimistically, rolled back on failure   |
//! | pause   | when `screening_paused` is pushed        |
//! | reset   | when the command API accepts it          |
//! | advance | when the command API accepts it          |
//!
//! Every command API call, and every confirmation wait, is bounded by
//! `command_timeout`. Pause releases the lock while it waits so the
//! confirming event can be applied.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hirewire_core::candidate::{Candidate, CandidateBoard, StageRef};
use hirewire_core::error::CoreError;
use hirewire_core::progress::{
    ProgressIndicator, ProgressReconciler, ProgressSnapshot, Reconciled, ScreeningSignal,
};
use hirewire_core::scoring::{require_scoring_config, validate_scoring_config, ScoringConfig};
use hirewire_core::screening::{ScreeningCommand, ScreeningJob, ScreeningStatus, StartKind};
use hirewire_core::types::DbId;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::Instant;

use crate::api::{ApiError, ResultsFilter, ScreeningApi};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::messages::CandidateScreenedData;

/// Pipeline stages a watched posting's candidates move between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStages {
    /// Stage the screening run feeds; candidates still here are selectable.
    pub present: Option<StageRef>,
    /// Stage `advance` moves candidates into.
    pub next: Option<StageRef>,
}

/// Result of a `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(StartKind),
    /// A run is already in progress; nothing was sent.
    AlreadyRunning,
}

struct ControllerState {
    reconciler: ProgressReconciler,
    board: CandidateBoard,
}

/// Screening orchestration for one job posting.
pub struct ScreeningController {
    job_posting_id: DbId,
    api: Arc<dyn ScreeningApi>,
    events: broadcast::Sender<ClientEvent>,
    state: Mutex<ControllerState>,
    job_tx: watch::Sender<ScreeningJob>,
    next_stage: Option<StageRef>,
    command_timeout: Duration,
}

impl ScreeningController {
    pub fn new(
        job_posting_id: DbId,
        stages: PipelineStages,
        api: Arc<dyn ScreeningApi>,
        events: broadcast::Sender<ClientEvent>,
        config: &ClientConfig,
    ) -> Arc<Self> {
        let reconciler =
            ProgressReconciler::new(job_posting_id).with_display_window(config.completion_display);
        let (job_tx, _) = watch::channel(reconciler.current());

        Arc::new(Self {
            job_posting_id,
            api,
            events,
            state: Mutex::new(ControllerState {
                reconciler,
                board: CandidateBoard::new(stages.present),
            }),
            job_tx,
            next_stage: stages.next,
            command_timeout: config.command_timeout,
        })
    }

    pub fn job_posting_id(&self) -> DbId {
        self.job_posting_id
    }

    /// Watch the merged run view; updated after every apply.
    pub fn subscribe_job(&self) -> watch::Receiver<ScreeningJob> {
        self.job_tx.subscribe()
    }

    pub async fn current(&self) -> ScreeningJob {
        self.state.lock().await.reconciler.current()
    }

    pub async fn indicator(&self) -> ProgressIndicator {
        self.state.lock().await.reconciler.indicator(Instant::now())
    }

    pub async fn candidates(&self) -> Vec<Candidate> {
        self.state.lock().await.board.candidates().cloned().collect()
    }

    /// Candidates selectable for advancement right now.
    pub async fn eligible(&self) -> BTreeSet<DbId> {
        self.state.lock().await.board.eligible()
    }

    /// "Select all", evaluated at call time.
    pub async fn select_all(&self) -> Vec<DbId> {
        self.state.lock().await.board.select_all()
    }

    // ---- scoring configuration ----

    pub async fn load_config(&self) -> Result<Option<ScoringConfig>, ClientError> {
        self.bounded("load config", self.api.get_config(self.job_posting_id))
            .await
    }

    /// Validate locally, then save.
    pub async fn save_config(&self, config: &ScoringConfig) -> Result<ScoringConfig, ClientError> {
        validate_scoring_config(config)?;
        let saved = self
            .bounded("save config", self.api.save_config(self.job_posting_id, config))
            .await?;
        tracing::info!(
            job_posting_id = self.job_posting_id,
            criteria = saved.criteria.len(),
            "Scoring config saved",
        );
        Ok(saved)
    }

    // ---- commands ----

    /// Start, resume, or restart the screening run.
    ///
    /// Refused without touching state when no valid rubric is configured.
    /// The run is shown as in progress before the command round-trip and
    /// rolled back if the command fails.
    pub async fn start(self: &Arc<Self>) -> Result<StartOutcome, ClientError> {
        if self.already_running(&*self.state.lock().await)? {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let config = self
            .bounded(
                ScreeningCommand::Start.as_str(),
                self.api.get_config(self.job_posting_id),
            )
            .await?;
        require_scoring_config(config.as_ref())?;

        let mut state = self.state.lock().await;
        // A pushed start may have landed while the rubric was fetched.
        if self.already_running(&state)? {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let checkpoint = state.reconciler.checkpoint();
        let kind = state.reconciler.start()?;
        self.publish(&state);

        let sent = self
            .bounded(
                ScreeningCommand::Start.as_str(),
                self.api.start_screening(self.job_posting_id),
            )
            .await;
        if let Err(err) = sent {
            tracing::warn!(job_posting_id = self.job_posting_id, error = %err, "Start failed, rolling back");
            state.reconciler.rollback(checkpoint);
            self.publish(&state);
            return Err(err);
        }

        tracing::info!(job_posting_id = self.job_posting_id, ?kind, "Screening started");
        self.emit(ClientEvent::ScreeningStarted {
            job_posting_id: self.job_posting_id,
            job_title: None,
        });
        Ok(StartOutcome::Started(kind))
    }

    /// Request a pause and wait for the server to confirm it.
    ///
    /// Returns the status that ended the wait: `paused`, or a terminal
    /// status if the run finished first.
    pub async fn pause(&self) -> Result<ScreeningStatus, ClientError> {
        let mut job_rx = self.job_tx.subscribe();
        {
            let mut state = self.state.lock().await;
            state.reconciler.request_pause()?;
            self.publish(&state);
        }

        let confirmed = tokio::time::timeout(self.command_timeout, async {
            self.api.pause_screening(self.job_posting_id).await?;
            job_rx
                .wait_for(|job| job.status != ScreeningStatus::InProgress)
                .await
                .map(|job| job.status)
                .map_err(|_| self.not_confirmed(ScreeningCommand::Pause))
        })
        .await
        .unwrap_or_else(|_| Err(self.not_confirmed(ScreeningCommand::Pause)));

        if let Err(err) = &confirmed {
            let mut state = self.state.lock().await;
            state.reconciler.cancel_pause_request();
            self.publish(&state);
            tracing::warn!(job_posting_id = self.job_posting_id, error = %err, "Pause was not confirmed");
        }
        confirmed
    }

    /// Destroy the run and every screening result on the board.
    ///
    /// Refused while running and once any candidate has been advanced.
    pub async fn reset(&self) -> Result<(), ClientError> {
        let mut state = self.state.lock().await;
        let advanced = state.board.advanced_count();
        state.reconciler.check_reset(advanced)?;

        self.bounded(
            ScreeningCommand::Reset.as_str(),
            self.api.reset_screening(self.job_posting_id),
        )
        .await?;

        state.reconciler.reset();
        state.board.clear_screening();
        self.publish(&state);
        tracing::info!(job_posting_id = self.job_posting_id, "Screening reset");
        Ok(())
    }

    /// Move `ids` to the next pipeline stage. All or nothing.
    ///
    /// Eligibility is checked against the board as it is at call time and
    /// the board stays locked until the stage update is applied.
    pub async fn advance(&self, ids: &[DbId], feedback: Option<&str>) -> Result<Vec<DbId>, ClientError> {
        let mut state = self.state.lock().await;
        state.reconciler.guard(ScreeningCommand::Advance)?;
        let planned = state.board.plan_advance(ids)?;
        let next = self.next_stage.ok_or_else(|| {
            CoreError::Validation("No next pipeline stage to advance into".to_string())
        })?;

        self.bounded(
            ScreeningCommand::Advance.as_str(),
            self.api.move_to_next_stage(&planned, feedback),
        )
        .await?;

        state.board.apply_advance(&planned, next)?;
        tracing::info!(
            job_posting_id = self.job_posting_id,
            count = planned.len(),
            stage_id = next.id,
            "Candidates advanced",
        );
        Ok(planned)
    }

    // ---- inbound ----

    /// Fetch and apply the progress snapshot.
    pub async fn refresh_progress(self: &Arc<Self>) -> Result<ScreeningJob, ClientError> {
        let snapshot = self
            .bounded("progress", self.api.progress(self.job_posting_id))
            .await?;
        Ok(self.apply_snapshot(&snapshot).await)
    }

    /// Replace the board with the server's result set.
    pub async fn refresh_results(&self, filter: &ResultsFilter) -> Result<usize, ClientError> {
        let results = self
            .bounded("results", self.api.results(self.job_posting_id, filter))
            .await?;
        let mut state = self.state.lock().await;
        state.board.replace_all(results);
        Ok(state.board.len())
    }

    pub async fn apply_snapshot(self: &Arc<Self>, snapshot: &ProgressSnapshot) -> ScreeningJob {
        let mut state = self.state.lock().await;
        let reconciled = state.reconciler.apply_snapshot(snapshot, Instant::now());
        if !reconciled.applied {
            tracing::debug!(job_posting_id = self.job_posting_id, "Stale snapshot discarded");
        }
        if reconciled.status_changed == Some(ScreeningStatus::NotStarted) {
            tracing::info!(job_posting_id = self.job_posting_id, "Screening was reset elsewhere");
            state.board.clear_screening();
        }
        self.announce(&state, &reconciled, None);
        state.reconciler.current()
    }

    /// Apply one pushed lifecycle signal.
    pub async fn apply_signal(self: &Arc<Self>, signal: &ScreeningSignal) -> Reconciled {
        let mut state = self.state.lock().await;
        let reconciled = state.reconciler.apply_event(signal, Instant::now());
        if !reconciled.applied {
            tracing::debug!(job_posting_id = self.job_posting_id, "Duplicate or stale signal discarded");
        }
        let job_title = match signal {
            ScreeningSignal::Started { job_title } | ScreeningSignal::Paused { job_title } => {
                job_title.clone()
            }
            ScreeningSignal::Progress { .. } => None,
        };
        self.announce(&state, &reconciled, job_title);
        reconciled
    }

    /// Record one candidate's scoring result.
    pub async fn record_screened(&self, data: &CandidateScreenedData) {
        let mut state = self.state.lock().await;
        state.board.record_screened(
            data.application_id,
            data.decision,
            data.scores.clone(),
            data.overall_score,
            data.screened_at.unwrap_or_else(Utc::now),
        );
        self.emit(ClientEvent::CandidateScreened {
            job_posting_id: self.job_posting_id,
            application_id: data.application_id,
        });
    }

    // ---- private helpers ----

    fn publish(&self, state: &ControllerState) {
        self.job_tx.send_replace(state.reconciler.current());
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    fn not_confirmed(&self, command: ScreeningCommand) -> ClientError {
        self.timed_out(command.as_str())
    }

    fn timed_out(&self, request: &'static str) -> ClientError {
        ClientError::NotConfirmed {
            command: request,
            waited: self.command_timeout,
        }
    }

    /// `Ok(true)` when a run is already in progress; an error when start is
    /// not allowed from the current status.
    fn already_running(&self, state: &ControllerState) -> Result<bool, CoreError> {
        if state.reconciler.status() == ScreeningStatus::InProgress {
            tracing::info!(job_posting_id = self.job_posting_id, "Screening already running");
            return Ok(true);
        }
        state.reconciler.guard(ScreeningCommand::Start)?;
        Ok(false)
    }

    /// Await a command API round-trip, bounded by the command timeout.
    async fn bounded<T, F>(&self, request: &'static str, call: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.command_timeout, call).await {
            Ok(result) => result.map_err(|e| {
                tracing::warn!(
                    job_posting_id = self.job_posting_id,
                    request,
                    error = %e,
                    "Request rejected",
                );
                e.into()
            }),
            Err(_) => {
                tracing::warn!(job_posting_id = self.job_posting_id, request, "Request timed out");
                Err(self.timed_out(request))
            }
        }
    }

    /// Publish the new view and turn what changed into client events.
    fn announce(self: &Arc<Self>, state: &ControllerState, reconciled: &Reconciled, job_title: Option<String>) {
        if !reconciled.applied {
            return;
        }
        self.publish(state);
        let job_posting_id = self.job_posting_id;

        for &percentage in &reconciled.milestones {
            tracing::info!(job_posting_id, percentage, "Screening milestone reached");
            self.emit(ClientEvent::ScreeningMilestone {
                job_posting_id,
                percentage,
            });
        }

        let job = state.reconciler.current();
        match reconciled.status_changed {
            Some(ScreeningStatus::InProgress) => self.emit(ClientEvent::ScreeningStarted {
                job_posting_id,
                job_title,
            }),
            Some(ScreeningStatus::Paused) => self.emit(ClientEvent::ScreeningPaused {
                job_posting_id,
                job_title,
            }),
            Some(ScreeningStatus::Completed) => {
                tracing::info!(
                    job_posting_id,
                    screened = job.screened_count,
                    total = job.total_candidates,
                    "Screening completed",
                );
                self.emit(ClientEvent::ScreeningCompleted {
                    job_posting_id,
                    screened: job.screened_count,
                    total: job.total_candidates,
                });
            }
            Some(ScreeningStatus::Failed) => {
                tracing::error!(job_posting_id, error = ?job.error, "Screening failed");
                self.emit(ClientEvent::ScreeningFailed {
                    job_posting_id,
                    error: job.error,
                });
            }
            Some(ScreeningStatus::NotStarted) | None => {}
        }

        if let Some(collapse_at) = reconciled.collapse_at {
            self.schedule_collapse(collapse_at);
        }
    }

    /// Announce the collapse once the display window has passed, unless a
    /// newer run replaced the completed one.
    fn schedule_collapse(self: &Arc<Self>, at: Instant) {
        let this = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            let Some(this) = this.upgrade() else {
                return;
            };
            let state = this.state.lock().await;
            if state.reconciler.collapse_due(Instant::now()) {
                this.publish(&state);
                this.emit(ClientEvent::ProgressCollapsed {
                    job_posting_id: this.job_posting_id,
                });
            }
        });
    }
}
