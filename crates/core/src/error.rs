use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Start was attempted without a usable scoring rubric.
    #[error("Scoring configuration required: {0}")]
    ConfigurationRequired(String),

    #[error("Cannot {action} screening while it is {status}")]
    InvalidTransition {
        action: &'static str,
        status: &'static str,
    },

    /// Reset would orphan candidates already moved down the pipeline.
    #[error("Cannot reset screening: {advanced} candidate(s) already advanced to a later stage")]
    ResetBlocked { advanced: usize },

    #[error("Ineligible candidate(s) in selection: {0:?}. Refresh the selection and retry")]
    IneligibleCandidates(Vec<DbId>),

    #[error("Conflict: {0}")]
    Conflict(String),
}
