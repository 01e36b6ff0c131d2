//! Push-channel frame handling and event routing.
//!
//! Raw frames are decoded into [`ServerMessage`]s and routed by an
//! exhaustive match: screening lifecycle and candidate results go to the
//! session's ordered store queue, informational and domain events go
//! straight to the [`ClientEvent`] broadcast for toasts. Malformed frames
//! are logged and dropped.

use hirewire_core::progress::ScreeningSignal;
use hirewire_core::types::DbId;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;

use crate::events::ClientEvent;
use crate::messages::{parse_message, CandidateScreenedData, ServerMessage};

/// Updates applied, in arrival order, by the session's store task.
#[derive(Debug, Clone)]
pub enum StoreUpdate {
    /// Screening lifecycle signal. `job_posting_id` is `None` when the
    /// payload does not name a posting; the store infers it from what is
    /// being watched.
    Screening {
        job_posting_id: Option<DbId>,
        signal: ScreeningSignal,
    },
    /// One candidate finished scoring.
    CandidateScreened(CandidateScreenedData),
    /// The channel (re)opened; snapshots should be re-fetched.
    ChannelOpened { connection_id: String },
}

/// What the connection loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    /// An application-level pong arrived.
    Pong,
    /// The peer closed the channel.
    Closed,
}

/// Routes decoded messages to the store queue and the event broadcast.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store_tx: mpsc::UnboundedSender<StoreUpdate>,
    event_tx: broadcast::Sender<ClientEvent>,
}

impl Dispatcher {
    pub fn new(
        store_tx: mpsc::UnboundedSender<StoreUpdate>,
        event_tx: broadcast::Sender<ClientEvent>,
    ) -> Self {
        Self { store_tx, event_tx }
    }

    /// Publish a client event. Having no subscribers is fine.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    fn push(&self, update: StoreUpdate) {
        if self.store_tx.send(update).is_err() {
            tracing::debug!("Store queue closed, dropping update");
        }
    }

    /// Tell the store a channel is open so it can resync snapshots.
    pub fn channel_opened(&self, connection_id: &str) {
        self.push(StoreUpdate::ChannelOpened {
            connection_id: connection_id.to_string(),
        });
    }

    /// Handle one raw WebSocket frame.
    pub fn handle_frame(&self, frame: Message) -> FrameOutcome {
        match frame {
            Message::Text(text) => self.handle_text(&text),
            Message::Binary(_) => {
                tracing::trace!("Ignoring binary frame");
                FrameOutcome::Continue
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Protocol-level control frames; tungstenite answers pings.
                FrameOutcome::Continue
            }
            Message::Close(frame) => {
                tracing::info!(?frame, "Push channel closed by server");
                FrameOutcome::Closed
            }
            Message::Frame(_) => FrameOutcome::Continue,
        }
    }

    /// Decode and dispatch a text frame. Malformed payloads are dropped.
    pub fn handle_text(&self, text: &str) -> FrameOutcome {
        match parse_message(text) {
            Ok(msg) => self.dispatch(msg),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_message = %text,
                    "Dropping malformed push message",
                );
                FrameOutcome::Continue
            }
        }
    }

    /// Route a decoded message.
    pub fn dispatch(&self, msg: ServerMessage) -> FrameOutcome {
        let job_posting_id = msg.job_posting_id();
        match msg {
            ServerMessage::Pong => {
                tracing::trace!("Heartbeat pong");
                return FrameOutcome::Pong;
            }
            ServerMessage::BulkScreeningStarted(data) => {
                tracing::info!(?job_posting_id, job_title = ?data.job_title, "Bulk screening started");
                self.push(StoreUpdate::Screening {
                    job_posting_id,
                    signal: ScreeningSignal::Started {
                        job_title: data.job_title,
                    },
                });
            }
            ServerMessage::ScreeningProgress(data) => {
                tracing::debug!(
                    ?job_posting_id,
                    percentage = data.progress.percentage,
                    screened = data.progress.screened_applications,
                    "Screening progress",
                );
                self.push(StoreUpdate::Screening {
                    job_posting_id,
                    signal: data.progress.to_signal(),
                });
            }
            ServerMessage::ScreeningPaused(data) => {
                tracing::info!(?job_posting_id, "Screening paused");
                self.push(StoreUpdate::Screening {
                    job_posting_id,
                    signal: ScreeningSignal::Paused {
                        job_title: data.job_title,
                    },
                });
            }
            ServerMessage::CandidateScreened(data) => {
                tracing::debug!(
                    ?job_posting_id,
                    application_id = data.application_id,
                    decision = data.decision.as_str(),
                    "Candidate screened",
                );
                self.push(StoreUpdate::CandidateScreened(data));
            }
            ServerMessage::ScreeningProgressUpdate(data) => {
                tracing::debug!(
                    ?job_posting_id,
                    application_id = ?data.application_id,
                    message = ?data.message,
                    "Candidate progress",
                );
                self.emit(ClientEvent::CandidateProgress {
                    job_posting_id: data.job_id,
                    application_id: data.application_id,
                    message: data.message,
                });
            }
            ServerMessage::NewApplication(data) => {
                self.emit(ClientEvent::ApplicationReceived {
                    job_posting_id: data.job_id,
                    application_id: data.application_id,
                    candidate_name: data.candidate_name,
                });
            }
            ServerMessage::JobUpdated(data) => {
                self.emit(ClientEvent::JobUpdated {
                    job_posting_id: data.job_id,
                    status: data.status,
                });
            }
        }
        FrameOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> (
        Dispatcher,
        mpsc::UnboundedReceiver<StoreUpdate>,
        broadcast::Receiver<ClientEvent>,
    ) {
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = broadcast::channel(16);
        (Dispatcher::new(store_tx, event_tx), store_rx, event_rx)
    }

    #[test]
    fn pong_is_reported_to_caller() {
        let (d, mut store, _) = dispatcher();
        assert_eq!(d.handle_text(r#"{"type":"pong"}"#), FrameOutcome::Pong);
        assert!(store.try_recv().is_err());
    }

    #[test]
    fn progress_goes_to_store_in_order() {
        let (d, mut store, _) = dispatcher();
        d.handle_text(r#"{"type":"screening_progress","job_id":3,"progress":{"percentage":10,"screened_applications":1}}"#);
        d.handle_text(r#"{"type":"screening_progress","job_id":3,"progress":{"percentage":20,"screened_applications":2}}"#);

        for expected in [10.0, 20.0] {
            match store.try_recv().unwrap() {
                StoreUpdate::Screening {
                    job_posting_id: Some(3),
                    signal: ScreeningSignal::Progress { update, .. },
                } => assert_eq!(update.percentage, expected),
                other => panic!("Expected progress update, got {other:?}"),
            }
        }
    }

    #[test]
    fn paused_and_started_become_signals() {
        let (d, mut store, _) = dispatcher();
        d.handle_text(r#"{"type":"bulk_screening_started","job_title":"QA"}"#);
        d.handle_text(r#"{"type":"screening_paused","job_title":"QA"}"#);

        assert!(matches!(
            store.try_recv().unwrap(),
            StoreUpdate::Screening {
                job_posting_id: None,
                signal: ScreeningSignal::Started { .. }
            }
        ));
        assert!(matches!(
            store.try_recv().unwrap(),
            StoreUpdate::Screening {
                signal: ScreeningSignal::Paused { .. },
                ..
            }
        ));
    }

    #[test]
    fn domain_events_go_to_broadcast() {
        let (d, mut store, mut events) = dispatcher();
        d.handle_text(r#"{"type":"new_application","job_id":3,"application_id":9}"#);

        assert!(store.try_recv().is_err());
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::ApplicationReceived {
                job_posting_id: 3,
                application_id: 9,
                candidate_name: None,
            }
        );
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let (d, mut store, mut events) = dispatcher();
        assert_eq!(d.handle_text(r#"{"type":"screening_progress"}"#), FrameOutcome::Continue);
        assert_eq!(d.handle_text("}{"), FrameOutcome::Continue);
        assert!(store.try_recv().is_err());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn close_frame_ends_loop() {
        let (d, _, _) = dispatcher();
        assert_eq!(d.handle_frame(Message::Close(None)), FrameOutcome::Closed);
        assert_eq!(d.handle_frame(Message::Binary(vec![1, 2])), FrameOutcome::Continue);
    }
}
