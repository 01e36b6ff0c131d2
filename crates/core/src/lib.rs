//! Domain logic for bulk candidate screening.
//!
//! Pure, I/O-free building blocks shared by the client: the screening
//! job state machine, progress reconciliation, the candidate board with
//! its stage-eligibility filter, and scoring-rubric validation.

pub mod candidate;
pub mod error;
pub mod progress;
pub mod scoring;
pub mod screening;
pub mod types;
