//! Push-channel connection manager.
//!
//! [`ConnectionManager`] owns at most one live channel per session. A
//! supervisor task runs the connect -> process -> backoff loop; the
//! manager's lock serializes `connect`/`disconnect` against it so that at
//! most one connection attempt is ever in flight.
//!
//! Every supervisor is tagged with a generation number. `disconnect` and a
//! fresh `connect` bump the generation, and a supervisor whose generation
//! is stale discards whatever its in-flight attempt produced.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use hirewire_core::types::Timestamp;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{ChannelClient, ChannelConnection, ChannelError};
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, FrameOutcome};
use crate::events::ClientEvent;
use crate::heartbeat::{ping_frame, Liveness};
use crate::reconnect::{ReconnectConfig, ReconnectDecision};

/// Lifecycle phase of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Never connected, or disconnected on purpose.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    Open,
    /// Waiting out a reconnect delay.
    Backoff,
    /// Reconnection gave up.
    Failed,
}

impl ConnectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Backoff => "backoff",
            Self::Failed => "failed",
        }
    }

    /// Phases in which `connect` must not start another attempt.
    fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Backoff)
    }
}

/// Point-in-time view of the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub connection_id: Option<String>,
    /// Consecutive failed opens since the last successful one.
    pub failures: u32,
    /// Last pong or server frame on the current channel.
    pub last_heartbeat: Option<Timestamp>,
}

struct ManagerState {
    phase: ConnectionPhase,
    generation: u64,
    failures: u32,
    connection_id: Option<String>,
    last_heartbeat: Option<Timestamp>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    heartbeat_interval: Duration,
    pong_timeout: Option<Duration>,
    reconnect: ReconnectConfig,
    dispatcher: Dispatcher,
    state: Mutex<ManagerState>,
}

/// Manages the push channel for one session.
///
/// Cheap to clone; clones share the same channel.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: &ClientConfig, dispatcher: Dispatcher) -> Self {
        Self {
            shared: Arc::new(Shared {
                heartbeat_interval: config.heartbeat_interval,
                pong_timeout: config.pong_timeout,
                reconnect: config.reconnect.clone(),
                dispatcher,
                state: Mutex::new(ManagerState {
                    phase: ConnectionPhase::Idle,
                    generation: 0,
                    failures: 0,
                    connection_id: None,
                    last_heartbeat: None,
                    cancel: None,
                    task: None,
                }),
            }),
        }
    }

    /// Open the channel for `client`'s session.
    ///
    /// No-op while a channel is open, an attempt is in flight, or a
    /// reconnect is scheduled. Starts over after `Failed` or `Idle`.
    pub async fn connect(&self, client: ChannelClient) {
        let mut state = self.shared.state.lock().await;
        if state.phase.is_active() {
            tracing::debug!(
                session_id = %client.session_id(),
                phase = state.phase.as_str(),
                "Connect ignored, channel already active",
            );
            return;
        }

        state.generation += 1;
        state.failures = 0;
        state.phase = ConnectionPhase::Connecting;
        state.connection_id = None;
        state.last_heartbeat = None;

        let cancel = CancellationToken::new();
        let generation = state.generation;
        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();

        tracing::info!(session_id = %client.session_id(), generation, "Starting push channel");
        state.cancel = Some(cancel);
        state.task = Some(tokio::spawn(async move {
            run_supervisor(shared, client, generation, task_cancel).await;
        }));
    }

    /// Close the channel and cancel any scheduled reconnect. Idempotent.
    pub async fn disconnect(&self) {
        let task = {
            let mut state = self.shared.state.lock().await;
            if state.phase == ConnectionPhase::Idle && state.task.is_none() {
                return;
            }
            state.generation += 1;
            state.phase = ConnectionPhase::Idle;
            state.connection_id = None;
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            state.task.take()
        };

        tracing::info!("Push channel disconnected");
        if let Some(task) = task {
            // The supervisor sends a close frame on cancellation. A connect
            // attempt in flight is not interrupted; its result is discarded.
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.state.lock().await.phase == ConnectionPhase::Open
    }

    pub async fn status(&self) -> ConnectionStatus {
        let state = self.shared.state.lock().await;
        ConnectionStatus {
            phase: state.phase,
            connection_id: state.connection_id.clone(),
            failures: state.failures,
            last_heartbeat: state.last_heartbeat,
        }
    }
}

impl Shared {
    /// Run `f` against the state only if `generation` is still current.
    async fn with_current<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut ManagerState) -> T,
    ) -> Option<T> {
        let mut state = self.state.lock().await;
        (state.generation == generation).then(|| f(&mut state))
    }
}

/// How a single open channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelEnd {
    /// Closed by the peer, a transport error, or a missed pong.
    Closed,
    /// Superseded by `disconnect`.
    Cancelled,
}

/// Connect -> process -> backoff, until cancelled or out of attempts.
async fn run_supervisor(
    shared: Arc<Shared>,
    client: ChannelClient,
    generation: u64,
    cancel: CancellationToken,
) {
    let session_id = client.session_id().to_string();

    loop {
        let attempt = client.connect().await;

        match attempt {
            Ok(conn) => {
                let connection_id = conn.connection_id.clone();
                let opened = shared
                    .with_current(generation, |state| {
                        state.phase = ConnectionPhase::Open;
                        state.failures = 0;
                        state.connection_id = Some(connection_id.clone());
                        state.last_heartbeat = Some(Utc::now());
                    })
                    .await
                    .is_some();

                if !opened || cancel.is_cancelled() {
                    tracing::debug!(%session_id, %connection_id, "Discarding superseded connection");
                    let mut ws = conn.ws_stream;
                    let _ = ws.close(None).await;
                    return;
                }

                shared.dispatcher.emit(ClientEvent::Connected {
                    connection_id: connection_id.clone(),
                });
                shared.dispatcher.channel_opened(&connection_id);

                let end = run_channel(&shared, conn, generation, &cancel).await;

                shared.dispatcher.emit(ClientEvent::Disconnected);
                if end == ChannelEnd::Cancelled {
                    return;
                }
                tracing::info!(%session_id, %connection_id, "Push channel closed");
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    return;
                }
                tracing::warn!(%session_id, error = %e, "Push channel connection failed");
            }
        }

        let Some(failures) = shared
            .with_current(generation, |state| {
                state.connection_id = None;
                state.failures
            })
            .await
        else {
            return;
        };

        match shared.reconnect.decide(failures) {
            ReconnectDecision::Retry(delay) => {
                let attempt = failures + 1;
                let scheduled = shared
                    .with_current(generation, |state| {
                        state.phase = ConnectionPhase::Backoff;
                        state.failures = attempt;
                    })
                    .await;
                if scheduled.is_none() {
                    return;
                }

                let delay_ms = delay.as_millis() as u64;
                tracing::info!(%session_id, attempt, delay_ms, "Reconnecting to push channel");
                shared
                    .dispatcher
                    .emit(ClientEvent::Reconnecting { attempt, delay_ms });

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                let resumed = shared
                    .with_current(generation, |state| {
                        state.phase = ConnectionPhase::Connecting;
                    })
                    .await;
                if resumed.is_none() {
                    return;
                }
            }
            ReconnectDecision::GiveUp => {
                let _ = shared
                    .with_current(generation, |state| {
                        state.phase = ConnectionPhase::Failed;
                        state.cancel = None;
                    })
                    .await;
                tracing::error!(
                    %session_id,
                    attempts = failures,
                    "Giving up on push channel",
                );
                shared
                    .dispatcher
                    .emit(ClientEvent::ConnectionLost { attempts: failures });
                return;
            }
        }
    }
}

/// Pump one open channel: heartbeat out, frames in.
async fn run_channel(
    shared: &Shared,
    conn: ChannelConnection,
    generation: u64,
    cancel: &CancellationToken,
) -> ChannelEnd {
    let connection_id = conn.connection_id;
    let (mut write, mut read) = conn.ws_stream.split();
    let mut liveness = Liveness::new(shared.heartbeat_interval, shared.pong_timeout);
    let mut ticker = liveness.ticker();

    loop {
        let pong_deadline = liveness.pong_deadline();

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return ChannelEnd::Cancelled;
            }

            _ = ticker.tick() => {
                let frame = match ping_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(%connection_id, error = %e, "Failed to encode heartbeat");
                        continue;
                    }
                };
                if let Err(e) = write.send(frame).await {
                    tracing::warn!(%connection_id, error = %e, "Heartbeat send failed");
                    return ChannelEnd::Closed;
                }
                tracing::trace!(%connection_id, "Heartbeat sent");
                liveness.record_ping(Instant::now());
            }

            _ = sleep_until_deadline(pong_deadline), if pong_deadline.is_some() => {
                tracing::warn!(%connection_id, "Heartbeat unanswered, closing channel");
                let _ = write.send(Message::Close(None)).await;
                return ChannelEnd::Closed;
            }

            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        let err = ChannelError::Protocol(e.to_string());
                        tracing::warn!(%connection_id, error = %err, "Push channel read error");
                        return ChannelEnd::Closed;
                    }
                    None => return ChannelEnd::Closed,
                };

                let is_text = frame.is_text();
                let outcome = shared.dispatcher.handle_frame(frame);
                if outcome == FrameOutcome::Pong {
                    liveness.record_pong(Instant::now());
                }
                if outcome == FrameOutcome::Closed {
                    return ChannelEnd::Closed;
                }
                if is_text {
                    let _ = shared
                        .with_current(generation, |state| state.last_heartbeat = Some(Utc::now()))
                        .await;
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
