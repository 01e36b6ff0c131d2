use std::time::Duration;

use hirewire_core::progress::DEFAULT_COMPLETION_DISPLAY_WINDOW;

use crate::error::ClientError;
use crate::heartbeat::HEARTBEAT_INTERVAL;
use crate::reconnect::ReconnectConfig;

/// Default bounded wait for confirmation-gated commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL, e.g. `http://localhost:8000/api`.
    pub api_url: String,
    /// Push channel base URL, e.g. `ws://localhost:8000`.
    pub ws_url: String,
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Close the channel if no pong arrives within this window. `None`
    /// leaves dead-socket detection to the transport.
    pub pong_timeout: Option<Duration>,
    pub reconnect: ReconnectConfig,
    /// Bounded wait for pause/reset/advance confirmation.
    pub command_timeout: Duration,
    /// How long a completed run stays visible.
    pub completion_display: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api".into(),
            ws_url: "ws://localhost:8000".into(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            pong_timeout: None,
            reconnect: ReconnectConfig::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            completion_display: DEFAULT_COMPLETION_DISPLAY_WINDOW,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                      |
    /// |------------------------------------|------------------------------|
    /// | `HIREWIRE_API_URL`                 | `http://localhost:8000/api`  |
    /// | `HIREWIRE_WS_URL`                  | `ws://localhost:8000`        |
    /// | `HIREWIRE_HEARTBEAT_SECS`          | `30`                         |
    /// | `HIREWIRE_PONG_TIMEOUT_SECS`       | unset (disabled)             |
    /// | `HIREWIRE_MAX_RECONNECT_ATTEMPTS`  | `10`                         |
    /// | `HIREWIRE_COMMAND_TIMEOUT_SECS`    | `30`                         |
    /// | `HIREWIRE_COMPLETION_DISPLAY_SECS` | `5`                          |
    pub fn from_env() -> Result<Self, ClientError> {
        let defaults = Self::default();

        let api_url = std::env::var("HIREWIRE_API_URL").unwrap_or(defaults.api_url);
        let ws_url = std::env::var("HIREWIRE_WS_URL").unwrap_or(defaults.ws_url);

        let heartbeat_interval = env_secs("HIREWIRE_HEARTBEAT_SECS")?
            .unwrap_or(defaults.heartbeat_interval);
        let pong_timeout = env_secs("HIREWIRE_PONG_TIMEOUT_SECS")?;
        let command_timeout =
            env_secs("HIREWIRE_COMMAND_TIMEOUT_SECS")?.unwrap_or(defaults.command_timeout);
        let completion_display = env_secs("HIREWIRE_COMPLETION_DISPLAY_SECS")?
            .unwrap_or(defaults.completion_display);

        let mut reconnect = defaults.reconnect;
        if let Some(max) = env_parse::<u32>("HIREWIRE_MAX_RECONNECT_ATTEMPTS")? {
            reconnect.max_attempts = max;
        }

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.trim_end_matches('/').to_string(),
            heartbeat_interval,
            pong_timeout,
            reconnect,
            command_timeout,
            completion_display,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ClientError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ClientError::Config(format!("{key} must be a valid number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>, ClientError> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}
