//! Scoring rubric types and validators.
//!
//! The rubric itself is evaluated by the external scoring service; the
//! client only needs to know whether one exists and is well-formed before
//! it lets a screening run start.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of criteria in one rubric.
pub const MAX_CRITERIA: usize = 20;

/// Maximum length for a criterion name.
pub const MAX_CRITERION_NAME_LEN: usize = 100;

/// Upper bound for a single criterion weight and for the threshold.
pub const MAX_SCORE: f64 = 100.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One weighted criterion of the rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringCriterion {
    pub name: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Rubric used to score every resume of a job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub criteria: Vec<ScoringCriterion>,
    /// Minimum overall score (0-100) for a `qualified` decision.
    pub qualification_threshold: f64,
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a rubric is well-formed.
///
/// Returns `Ok(())` if valid, or a `CoreError::Validation` describing the
/// first problem found.
pub fn validate_scoring_config(config: &ScoringConfig) -> Result<(), CoreError> {
    if config.criteria.is_empty() {
        return Err(CoreError::Validation(
            "Scoring config must include at least one criterion".to_string(),
        ));
    }
    if config.criteria.len() > MAX_CRITERIA {
        return Err(CoreError::Validation(format!(
            "Scoring config has too many criteria (max {MAX_CRITERIA})"
        )));
    }

    let mut seen = HashSet::new();
    for criterion in &config.criteria {
        let name = criterion.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "Criterion name must not be empty".to_string(),
            ));
        }
        if name.len() > MAX_CRITERION_NAME_LEN {
            return Err(CoreError::Validation(format!(
                "Criterion name too long (max {MAX_CRITERION_NAME_LEN} characters)"
            )));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(CoreError::Validation(format!(
                "Duplicate criterion name: '{name}'"
            )));
        }
        if !(criterion.weight > 0.0 && criterion.weight <= MAX_SCORE) {
            return Err(CoreError::Validation(format!(
                "Weight for '{name}' must be in (0, {MAX_SCORE}], got {}",
                criterion.weight
            )));
        }
    }

    if !(0.0..=MAX_SCORE).contains(&config.qualification_threshold) {
        return Err(CoreError::Validation(format!(
            "Qualification threshold must be in [0, {MAX_SCORE}], got {}",
            config.qualification_threshold
        )));
    }

    Ok(())
}

/// Gate used by the start command: a rubric must exist and be valid.
///
/// Both failure modes are reported as `ConfigurationRequired` so the caller
/// can send the user to the configuration screen.
pub fn require_scoring_config(config: Option<&ScoringConfig>) -> Result<&ScoringConfig, CoreError> {
    let config = config.ok_or_else(|| {
        CoreError::ConfigurationRequired(
            "configure the scoring rubric before starting screening".to_string(),
        )
    })?;
    validate_scoring_config(config).map_err(|e| match e {
        CoreError::Validation(msg) => CoreError::ConfigurationRequired(msg),
        other => other,
    })?;
    Ok(config)
}
