use std::time::Duration;

use hirewire_core::error::CoreError;
use hirewire_core::types::DbId;

use crate::api::ApiError;
use crate::client::ChannelError;

/// Message shown when the command API failed without a stated reason.
pub const GENERIC_FAILURE_MESSAGE: &str = "The request could not be completed. Please try again.";

/// Errors surfaced by the session and screening controllers.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Local guard refused the action (configuration, transition, eligibility).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The command API failed or declined the request.
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A confirmation-gated command did not confirm in time.
    #[error("{command} was not confirmed within {}s", waited.as_secs())]
    NotConfirmed {
        command: &'static str,
        waited: Duration,
    },

    /// Reconnection gave up.
    #[error("Connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job posting {0} is not being watched")]
    NotWatching(DbId),
}

impl ClientError {
    /// Text suitable for an inline error next to the control that failed.
    ///
    /// Server rejections are passed through verbatim when the server gave
    /// a reason; transport failures get a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::Rejected { reason, .. }) => reason.clone(),
            Self::Api(ApiError::Request(_)) | Self::Channel(_) => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}
