//! Shared helpers for client integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use hirewire_client::api::{ApiError, ResultsFilter, ScreeningApi};
use hirewire_core::candidate::{Candidate, Decision, StageRef};
use hirewire_core::progress::ProgressSnapshot;
use hirewire_core::scoring::{ScoringConfig, ScoringCriterion};
use hirewire_core::screening::ScreeningStatus;
use hirewire_core::types::DbId;

// ---------------------------------------------------------------------------
// Fake command API
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeState {
    pub config: Option<ScoringConfig>,
    pub progress: Option<ProgressSnapshot>,
    pub results: Vec<Candidate>,
    /// Command name -> rejection reason.
    rejections: HashMap<&'static str, String>,
    /// Commands that never answer.
    stalls: HashSet<&'static str>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeApi {
    pub state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn with_config() -> Self {
        let api = Self::default();
        api.state.lock().unwrap().config = Some(rubric());
        api
    }

    pub fn reject(&self, command: &'static str, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert(command, reason.to_string());
    }

    pub fn stall(&self, command: &'static str) {
        self.state.lock().unwrap().stalls.insert(command);
    }

    pub fn set_results(&self, results: Vec<Candidate>) {
        self.state.lock().unwrap().results = results;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: &'static str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        match state.rejections.get(call) {
            Some(reason) => Err(ApiError::Rejected {
                status: 400,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn respond(&self, call: &'static str) -> Result<(), ApiError> {
        self.record(call)?;
        let stalled = self.state.lock().unwrap().stalls.contains(call);
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl ScreeningApi for FakeApi {
    async fn get_config(&self, _job: DbId) -> Result<Option<ScoringConfig>, ApiError> {
        self.respond("get_config").await?;
        Ok(self.state.lock().unwrap().config.clone())
    }

    async fn save_config(&self, _job: DbId, config: &ScoringConfig) -> Result<ScoringConfig, ApiError> {
        self.respond("save_config").await?;
        self.state.lock().unwrap().config = Some(config.clone());
        Ok(config.clone())
    }

    async fn start_screening(&self, _job: DbId) -> Result<(), ApiError> {
        self.respond("start").await
    }

    async fn progress(&self, _job: DbId) -> Result<ProgressSnapshot, ApiError> {
        self.respond("progress").await?;
        let snapshot = self.state.lock().unwrap().progress.clone();
        Ok(snapshot.unwrap_or(ProgressSnapshot {
            status: ScreeningStatus::NotStarted,
            total: 0,
            screened: 0,
            percentage: 0.0,
            error: None,
            sequence: None,
        }))
    }

    async fn results(&self, _job: DbId, _filter: &ResultsFilter) -> Result<Vec<Candidate>, ApiError> {
        self.respond("results").await?;
        Ok(self.state.lock().unwrap().results.clone())
    }

    async fn pause_screening(&self, _job: DbId) -> Result<(), ApiError> {
        self.respond("pause").await
    }

    async fn reset_screening(&self, _job: DbId) -> Result<(), ApiError> {
        self.respond("reset").await
    }

    async fn move_to_next_stage(&self, _ids: &[DbId], _feedback: Option<&str>) -> Result<(), ApiError> {
        self.respond("advance").await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn rubric() -> ScoringConfig {
    ScoringConfig {
        criteria: vec![ScoringCriterion {
            name: "Rust experience".into(),
            weight: 60.0,
            description: None,
        }],
        qualification_threshold: 70.0,
    }
}

pub fn candidate(id: DbId, decision: Decision, stage: Option<StageRef>) -> Candidate {
    Candidate {
        id,
        decision,
        scores: BTreeMap::from([("Rust experience".to_string(), 80.0)]),
        overall_score: Some(80.0),
        current_stage: stage,
        is_screened: true,
        screened_at: Some(Utc::now()),
    }
}
