//! Liveness monitor for an open push channel.
//!
//! Sends `{"type":"ping"}` on a fixed interval while the channel is open.
//! A dead socket normally surfaces through the channel's own close/error
//! signal; the optional pong timeout adds an independent check for
//! deployments that want one.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

use crate::messages::ClientMessage;

/// Interval between heartbeat pings.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Per-connection heartbeat state. Created when the channel opens and
/// dropped when it closes.
#[derive(Debug)]
pub struct Liveness {
    interval: Duration,
    pong_timeout: Option<Duration>,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
}

impl Liveness {
    pub fn new(interval: Duration, pong_timeout: Option<Duration>) -> Self {
        Self {
            interval,
            pong_timeout,
            last_ping: None,
            last_pong: None,
        }
    }

    /// Ticker whose first tick fires immediately, giving the heartbeat
    /// sent right after open.
    pub fn ticker(&self) -> Interval {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping = Some(now);
    }

    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
    }

    /// When the outstanding ping expires, if a pong timeout is configured
    /// and the latest ping is still unanswered.
    pub fn pong_deadline(&self) -> Option<Instant> {
        let (Some(timeout), Some(ping)) = (self.pong_timeout, self.last_ping) else {
            return None;
        };
        let answered = self.last_pong.is_some_and(|pong| pong >= ping);
        (!answered).then_some(ping + timeout)
    }
}

/// The heartbeat text frame.
pub fn ping_frame() -> Result<Message, serde_json::Error> {
    Ok(Message::Text(ClientMessage::Ping.to_json()?))
}
