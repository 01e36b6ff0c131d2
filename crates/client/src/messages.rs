//! Push-channel message types and parser.
//!
//! The server sends flat JSON objects discriminated by a `"type"` field,
//! e.g. `{"type": "screening_progress", "job_id": 4, "progress": {...}}`.
//! This module deserializes them into the closed [`ServerMessage`] enum so
//! the dispatcher can match exhaustively. The client only ever sends
//! [`ClientMessage::Ping`].

use std::collections::BTreeMap;

use hirewire_core::candidate::Decision;
use hirewire_core::progress::ScreeningSignal;
use hirewire_core::screening::{ProgressUpdate, ScreeningStatus};
use hirewire_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// All known server-to-client message types.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Heartbeat reply.
    #[serde(rename = "pong")]
    Pong,

    /// A bulk screening run started.
    #[serde(rename = "bulk_screening_started")]
    BulkScreeningStarted(JobNoticeData),

    /// Aggregate progress of a screening run.
    #[serde(rename = "screening_progress")]
    ScreeningProgress(ScreeningProgressData),

    /// Per-candidate progress note. Informational only.
    #[serde(rename = "screening_progress_update")]
    ScreeningProgressUpdate(CandidateProgressData),

    /// The server confirmed a pause request.
    #[serde(rename = "screening_paused")]
    ScreeningPaused(JobNoticeData),

    /// One candidate finished scoring.
    #[serde(rename = "candidate_screened")]
    CandidateScreened(CandidateScreenedData),

    /// A new application arrived for a job posting.
    #[serde(rename = "new_application")]
    NewApplication(NewApplicationData),

    /// A job posting changed (published, closed, edited).
    #[serde(rename = "job_updated")]
    JobUpdated(JobUpdatedData),
}

/// Payload for `bulk_screening_started` and `screening_paused`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobNoticeData {
    #[serde(default)]
    pub job_id: Option<DbId>,
    #[serde(default)]
    pub job_title: Option<String>,
}

/// Payload for `screening_progress`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningProgressData {
    #[serde(default)]
    pub job_id: Option<DbId>,
    pub progress: ProgressPayload,
}

/// Progress counters as sent by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressPayload {
    pub percentage: f64,
    #[serde(default)]
    pub screened_applications: u32,
    #[serde(default)]
    pub total_applications: Option<u32>,
    #[serde(default)]
    pub status: Option<ScreeningStatus>,
    #[serde(default)]
    pub error: Option<String>,
    /// Server-side monotonic counter, when provided.
    #[serde(default)]
    pub sequence: Option<u64>,
}

impl ProgressPayload {
    pub fn to_signal(&self) -> ScreeningSignal {
        ScreeningSignal::Progress {
            sequence: self.sequence,
            update: ProgressUpdate {
                status: self.status,
                total: self.total_applications,
                screened: self.screened_applications,
                percentage: self.percentage,
                error: self.error.clone(),
            },
        }
    }
}

/// Payload for `screening_progress_update`.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateProgressData {
    #[serde(default)]
    pub job_id: Option<DbId>,
    #[serde(default)]
    pub application_id: Option<DbId>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload for `candidate_screened`.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateScreenedData {
    #[serde(default)]
    pub job_id: Option<DbId>,
    pub application_id: DbId,
    pub decision: Decision,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub screened_at: Option<Timestamp>,
}

/// Payload for `new_application`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewApplicationData {
    pub job_id: DbId,
    pub application_id: DbId,
    #[serde(default)]
    pub candidate_name: Option<String>,
}

/// Payload for `job_updated`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobUpdatedData {
    pub job_id: DbId,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ServerMessage {
    /// Job posting the message is scoped to, when the payload names one.
    pub fn job_posting_id(&self) -> Option<DbId> {
        match self {
            Self::Pong => None,
            Self::BulkScreeningStarted(d) | Self::ScreeningPaused(d) => d.job_id,
            Self::ScreeningProgress(d) => d.job_id,
            Self::ScreeningProgressUpdate(d) => d.job_id,
            Self::CandidateScreened(d) => d.job_id,
            Self::NewApplication(d) => Some(d.job_id),
            Self::JobUpdated(d) => Some(d.job_id),
        }
    }
}

/// Parse a push-channel text frame into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log and drop the frame.
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Client-to-server messages.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
