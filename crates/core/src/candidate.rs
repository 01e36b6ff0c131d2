//! Screening view of candidates, the stage-eligibility filter, and
//! all-or-nothing advance planning.
//!
//! Eligibility is derived, never stored: every query recomputes it from
//! the current board so a candidate moved by another actor between render
//! and click cannot slip into a selection.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Decision constants
// ---------------------------------------------------------------------------

pub const DECISION_PENDING: &str = "pending";
pub const DECISION_QUALIFIED: &str = "qualified";
pub const DECISION_REJECTED: &str = "rejected";

/// Screening decision for one candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    #[default]
    Pending,
    Qualified,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => DECISION_PENDING,
            Self::Qualified => DECISION_QUALIFIED,
            Self::Rejected => DECISION_REJECTED,
        }
    }
}

/// Reference to a pipeline stage. `position` orders stages front to back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageRef {
    pub id: DbId,
    pub position: u32,
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// Screening-relevant view of one application.
///
/// `decision`, `scores` and `overall_score` only carry meaning once
/// `is_screened` is true. `current_stage` only moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: DbId,
    #[serde(default)]
    pub decision: Decision,
    /// Per-criterion scores keyed by criterion name.
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub current_stage: Option<StageRef>,
    #[serde(default)]
    pub is_screened: bool,
    #[serde(default)]
    pub screened_at: Option<Timestamp>,
}

impl Candidate {
    pub fn unscreened(id: DbId) -> Self {
        Self {
            id,
            decision: Decision::Pending,
            scores: BTreeMap::new(),
            overall_score: None,
            current_stage: None,
            is_screened: false,
            screened_at: None,
        }
    }

    /// Wipe everything the screening run produced. Stage is left alone.
    pub fn clear_screening(&mut self) {
        self.decision = Decision::Pending;
        self.scores.clear();
        self.overall_score = None;
        self.is_screened = false;
        self.screened_at = None;
    }

    /// True if `stage` is strictly ahead of where the candidate is now.
    pub fn can_move_to(&self, stage: StageRef) -> bool {
        match self.current_stage {
            Some(current) => stage.position > current.position,
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Whether a single candidate may be selected for advancement out of
/// `present_stage`.
pub fn is_eligible(candidate: &Candidate, present_stage: Option<StageRef>) -> bool {
    if !candidate.is_screened || candidate.decision != Decision::Qualified {
        return false;
    }
    match (candidate.current_stage, present_stage) {
        (None, _) => true,
        (Some(current), Some(present)) => current.id == present.id,
        (Some(_), None) => false,
    }
}

/// Compute the eligible set for a candidate collection.
pub fn eligible<'a, I>(candidates: I, present_stage: Option<StageRef>) -> BTreeSet<DbId>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    candidates
        .into_iter()
        .filter(|c| is_eligible(c, present_stage))
        .map(|c| c.id)
        .collect()
}

// ---------------------------------------------------------------------------
// CandidateBoard
// ---------------------------------------------------------------------------

/// All candidates of one job posting, evaluated against the stage the
/// screening run feeds.
#[derive(Debug, Clone, Default)]
pub struct CandidateBoard {
    candidates: BTreeMap<DbId, Candidate>,
    present_stage: Option<StageRef>,
}

impl CandidateBoard {
    pub fn new(present_stage: Option<StageRef>) -> Self {
        Self {
            candidates: BTreeMap::new(),
            present_stage,
        }
    }

    pub fn present_stage(&self) -> Option<StageRef> {
        self.present_stage
    }

    pub fn set_present_stage(&mut self, stage: Option<StageRef>) {
        self.present_stage = stage;
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: DbId) -> Option<&Candidate> {
        self.candidates.get(&id)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    /// Replace the whole board with a freshly fetched result set.
    pub fn replace_all(&mut self, candidates: Vec<Candidate>) {
        self.candidates = candidates.into_iter().map(|c| (c.id, c)).collect();
    }

    /// Record the outcome of scoring one candidate.
    ///
    /// Unknown ids are inserted so a pushed result is never lost before the
    /// next results fetch. The stage is never touched here.
    pub fn record_screened(
        &mut self,
        id: DbId,
        decision: Decision,
        scores: BTreeMap<String, f64>,
        overall_score: Option<f64>,
        screened_at: Timestamp,
    ) {
        let candidate = self
            .candidates
            .entry(id)
            .or_insert_with(|| Candidate::unscreened(id));
        candidate.decision = decision;
        candidate.scores = scores;
        candidate.overall_score = overall_score;
        candidate.is_screened = true;
        candidate.screened_at = Some(screened_at);
    }

    /// Current eligible set, recomputed on every call.
    pub fn eligible(&self) -> BTreeSet<DbId> {
        eligible(self.candidates.values(), self.present_stage)
    }

    /// "Select all": recomputes at call time, never reuses an earlier list.
    pub fn select_all(&self) -> Vec<DbId> {
        self.eligible().into_iter().collect()
    }

    /// Number of candidates holding any pipeline stage. Non-zero blocks reset.
    pub fn advanced_count(&self) -> usize {
        self.candidates
            .values()
            .filter(|c| c.current_stage.is_some())
            .count()
    }

    /// Validate a selection for advancement.
    ///
    /// The selection must be non-empty and every id must be eligible right
    /// now; otherwise the whole request is refused. Returns the de-duplicated
    /// ids on success.
    pub fn plan_advance(&self, ids: &[DbId]) -> Result<Vec<DbId>, CoreError> {
        if ids.is_empty() {
            return Err(CoreError::Validation(
                "Select at least one candidate to advance".to_string(),
            ));
        }

        let eligible = self.eligible();
        let selection: BTreeSet<DbId> = ids.iter().copied().collect();
        let ineligible: Vec<DbId> = selection
            .iter()
            .filter(|id| !eligible.contains(id))
            .copied()
            .collect();

        if !ineligible.is_empty() {
            return Err(CoreError::IneligibleCandidates(ineligible));
        }
        Ok(selection.into_iter().collect())
    }

    /// Move candidates to `stage` after the command API accepted the request.
    ///
    /// Every id is checked before any candidate is touched so a bad id leaves
    /// the board unchanged.
    pub fn apply_advance(&mut self, ids: &[DbId], stage: StageRef) -> Result<(), CoreError> {
        for id in ids {
            let candidate = self.candidates.get(id).ok_or(CoreError::NotFound {
                entity: "candidate",
                id: *id,
            })?;
            if !candidate.can_move_to(stage) {
                return Err(CoreError::Conflict(format!(
                    "Candidate {id} cannot move backwards to stage {}",
                    stage.id
                )));
            }
        }
        for id in ids {
            if let Some(candidate) = self.candidates.get_mut(id) {
                candidate.current_stage = Some(stage);
            }
        }
        Ok(())
    }

    /// Wipe every screening-derived field on every candidate.
    pub fn clear_screening(&mut self) {
        for candidate in self.candidates.values_mut() {
            candidate.clear_screening();
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    const SCREENING: StageRef = StageRef { id: 10, position: 1 };
    const INTERVIEW: StageRef = StageRef { id: 11, position: 2 };

    fn qualified(id: DbId) -> Candidate {
        Candidate {
            decision: Decision::Qualified,
            is_screened: true,
            screened_at: Some(Utc::now()),
            overall_score: Some(82.0),
            ..Candidate::unscreened(id)
        }
    }

    fn board(candidates: Vec<Candidate>) -> CandidateBoard {
        let mut board = CandidateBoard::new(Some(SCREENING));
        board.replace_all(candidates);
        board
    }

    // --- Eligibility ---

    #[test]
    fn qualified_screened_unstaged_is_eligible() {
        assert!(is_eligible(&qualified(1), Some(SCREENING)));
    }

    #[test]
    fn candidate_at_present_stage_is_eligible() {
        let c = Candidate {
            current_stage: Some(SCREENING),
            ..qualified(1)
        };
        assert!(is_eligible(&c, Some(SCREENING)));
    }

    #[test]
    fn candidate_already_at_next_stage_is_excluded() {
        let c = Candidate {
            current_stage: Some(INTERVIEW),
            ..qualified(1)
        };
        assert!(!is_eligible(&c, Some(SCREENING)));
    }

    #[test]
    fn unscreened_or_unqualified_is_excluded() {
        let pending = Candidate {
            is_screened: false,
            ..qualified(1)
        };
        let rejected = Candidate {
            decision: Decision::Rejected,
            ..qualified(2)
        };
        assert!(!is_eligible(&pending, Some(SCREENING)));
        assert!(!is_eligible(&rejected, Some(SCREENING)));
    }

    #[test]
    fn staged_candidate_without_present_stage_is_excluded() {
        let c = Candidate {
            current_stage: Some(SCREENING),
            ..qualified(1)
        };
        assert!(!is_eligible(&c, None));
    }

    #[test]
    fn select_all_reflects_latest_board() {
        let mut board = board(vec![qualified(1), qualified(2), qualified(3)]);
        assert_eq!(board.select_all(), vec![1, 2, 3]);

        // Another actor moves candidate 2 between render and click.
        board.apply_advance(&[2], INTERVIEW).unwrap();
        assert_eq!(board.select_all(), vec![1, 3]);
    }

    // --- Advance planning ---

    #[test]
    fn plan_advance_rejects_empty_selection() {
        let board = board(vec![qualified(1)]);
        assert_matches!(board.plan_advance(&[]), Err(CoreError::Validation(_)));
    }

    #[test]
    fn plan_advance_is_all_or_nothing() {
        let rejected = Candidate {
            decision: Decision::Rejected,
            ..qualified(2)
        };
        let board = board(vec![qualified(1), rejected]);

        let err = board.plan_advance(&[1, 2]).unwrap_err();
        assert_matches!(err, CoreError::IneligibleCandidates(ids) if ids == vec![2]);
    }

    #[test]
    fn plan_advance_flags_unknown_ids() {
        let board = board(vec![qualified(1)]);
        assert_matches!(
            board.plan_advance(&[1, 99]),
            Err(CoreError::IneligibleCandidates(ids)) if ids == vec![99]
        );
    }

    #[test]
    fn plan_advance_deduplicates() {
        let board = board(vec![qualified(1), qualified(2)]);
        assert_eq!(board.plan_advance(&[2, 1, 2]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn apply_advance_refuses_backward_move_without_partial_update() {
        let ahead = Candidate {
            current_stage: Some(INTERVIEW),
            ..qualified(2)
        };
        let mut board = board(vec![qualified(1), ahead]);

        assert!(board.apply_advance(&[1, 2], SCREENING).is_err());
        assert_eq!(board.get(1).unwrap().current_stage, None);
        assert_eq!(board.get(2).unwrap().current_stage, Some(INTERVIEW));
    }

    #[test]
    fn advanced_count_tracks_staged_candidates() {
        let mut board = board(vec![qualified(1), qualified(2)]);
        assert_eq!(board.advanced_count(), 0);
        board.apply_advance(&[1], INTERVIEW).unwrap();
        assert_eq!(board.advanced_count(), 1);
    }

    // --- Screening results ---

    #[test]
    fn record_screened_upserts_without_touching_stage() {
        let mut board = board(vec![Candidate {
            current_stage: Some(SCREENING),
            ..Candidate::unscreened(5)
        }]);
        let scores = BTreeMap::from([("Skills".to_string(), 90.0)]);

        board.record_screened(5, Decision::Qualified, scores.clone(), Some(90.0), Utc::now());
        board.record_screened(6, Decision::Rejected, BTreeMap::new(), Some(20.0), Utc::now());

        let five = board.get(5).unwrap();
        assert!(five.is_screened);
        assert_eq!(five.scores, scores);
        assert_eq!(five.current_stage, Some(SCREENING));
        assert_eq!(board.get(6).unwrap().decision, Decision::Rejected);
    }

    #[test]
    fn clear_screening_wipes_derived_fields() {
        let mut board = board(vec![qualified(1)]);
        board.clear_screening();
        let c = board.get(1).unwrap();
        assert!(!c.is_screened);
        assert_eq!(c.decision, Decision::Pending);
        assert!(c.overall_score.is_none());
        assert!(board.eligible().is_empty());
    }
}
