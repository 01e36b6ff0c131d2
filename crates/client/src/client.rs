//! WebSocket client for the push channel.
//!
//! [`ChannelClient`] holds the endpoint for one session. Call
//! [`ChannelClient::connect`] to establish a live [`ChannelConnection`].
//! The endpoint is re-derived from the same session on every call, so a
//! reconnect never requires a fresh login.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Raw WebSocket stream type used by the push channel.
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Path of the notification socket relative to the WebSocket base URL.
pub const CHANNEL_PATH: &str = "/ws/notifications/";

/// Connection handle for one session's push channel.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    session_id: String,
    ws_url: String,
    token: String,
}

/// A live push-channel connection.
pub struct ChannelConnection {
    /// Unique id for this physical connection; changes on every reconnect.
    pub connection_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: WsStream,
}

impl ChannelClient {
    /// * `session_id` - logical session the channel belongs to.
    /// * `ws_url`     - WebSocket base URL, e.g. `ws://host:8000`.
    /// * `token`      - session credential passed during the handshake.
    pub fn new(session_id: String, ws_url: String, token: String) -> Self {
        Self {
            session_id,
            ws_url: ws_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// WebSocket base URL (e.g. `ws://host:8000`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full endpoint including the session credential.
    pub fn endpoint(&self) -> String {
        format!("{}{}?token={}", self.ws_url, CHANNEL_PATH, self.token)
    }

    /// Open the push channel.
    pub async fn connect(&self) -> Result<ChannelConnection, ChannelError> {
        let (ws_stream, _response) = connect_async(self.endpoint()).await.map_err(|e| {
            ChannelError::Connection(format!(
                "Failed to connect to push channel at {}: {e}",
                self.ws_url
            ))
        })?;

        let connection_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            session_id = %self.session_id,
            connection_id = %connection_id,
            "Connected to push channel at {}",
            self.ws_url,
        );

        Ok(ChannelConnection {
            connection_id,
            ws_stream,
        })
    }
}

/// Errors that can occur on the push channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
