//! Client-level events for toast/alerting subscribers.
//!
//! Produced by the connection manager (transport lifecycle) and by the
//! screening controllers (run lifecycle) after interpreting push messages.
//! Delivered over a [`tokio::sync::broadcast`] channel; see
//! [`Session::subscribe`](crate::session::Session::subscribe).

use hirewire_core::types::DbId;
use serde::Serialize;

/// Broadcast channel capacity for client events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A user-facing event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The push channel opened (initially or after a reconnect).
    Connected { connection_id: String },

    /// The push channel closed; a reconnect may follow.
    Disconnected,

    /// A reconnect attempt is scheduled.
    Reconnecting { attempt: u32, delay_ms: u64 },

    /// Reconnection gave up. Terminal until the next `connect`.
    ConnectionLost { attempts: u32 },

    /// A screening run started.
    ScreeningStarted {
        job_posting_id: DbId,
        job_title: Option<String>,
    },

    /// A screening run crossed a milestone for the first time.
    ScreeningMilestone { job_posting_id: DbId, percentage: u8 },

    /// The server confirmed a pause.
    ScreeningPaused {
        job_posting_id: DbId,
        job_title: Option<String>,
    },

    ScreeningCompleted {
        job_posting_id: DbId,
        screened: u32,
        total: u32,
    },

    ScreeningFailed {
        job_posting_id: DbId,
        error: Option<String>,
    },

    /// The completed-run display window elapsed.
    ProgressCollapsed { job_posting_id: DbId },

    /// One candidate finished scoring.
    CandidateScreened {
        job_posting_id: DbId,
        application_id: DbId,
    },

    /// Per-candidate progress note forwarded as-is.
    CandidateProgress {
        job_posting_id: Option<DbId>,
        application_id: Option<DbId>,
        message: Option<String>,
    },

    ApplicationReceived {
        job_posting_id: DbId,
        application_id: DbId,
        candidate_name: Option<String>,
    },

    JobUpdated {
        job_posting_id: DbId,
        status: Option<String>,
    },
}
