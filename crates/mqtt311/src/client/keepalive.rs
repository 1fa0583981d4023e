//! Keepalive heartbeat: last-send tracking and the background ping task.

use mqtt311_protocol::{MqttError, Packet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ClientCore, ClientState, TaskKind};

/// Tracks the time since the last outbound packet and whether a PINGREQ is
/// awaiting its PINGRESP.
#[derive(Debug)]
pub(crate) struct Tracker {
    interval: Duration,
    last_sent: Instant,
    pending_ping: bool,
}

impl Tracker {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: Instant::now(),
            pending_ping: false,
        }
    }

    /// Restarts the window and forgets any outstanding ping.
    pub(crate) fn reset(&mut self) {
        self.last_sent = Instant::now();
        self.pending_ping = false;
    }

    /// Records an outbound packet without touching the pending flag.
    pub(crate) fn touch(&mut self) {
        self.last_sent = Instant::now();
    }

    /// Time left before a PINGREQ is due; `None` once the interval has
    /// elapsed.
    pub(crate) fn window(&self) -> Option<Duration> {
        let remaining = self.interval.checked_sub(self.last_sent.elapsed())?;
        (remaining > Duration::ZERO).then_some(remaining)
    }

    pub(crate) fn ping(&mut self) {
        self.pending_ping = true;
    }

    pub(crate) fn pong(&mut self) {
        self.pending_ping = false;
        self.reset();
    }

    pub(crate) fn pending(&self) -> bool {
        self.pending_ping
    }
}

enum PingAction {
    Wait,
    SendPing,
    MissingPong,
}

/// Checks the window every half interval: a closed window sends a PINGREQ,
/// a closed window with a ping still outstanding is a dead connection.
pub(crate) async fn keepalive_task(core: Arc<ClientCore>, interval: Duration) {
    tracing::debug!(?interval, "keepalive task started");

    let mut ticker = tokio::time::interval(interval / 2);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match core.state() {
            ClientState::Connecting | ClientState::Connected => {}
            _ => break,
        }

        let action = {
            let mut tracker = core.tracker.lock();
            match tracker.as_mut() {
                Some(tracker) if tracker.window().is_none() => {
                    if tracker.pending() {
                        PingAction::MissingPong
                    } else {
                        tracker.ping();
                        PingAction::SendPing
                    }
                }
                _ => PingAction::Wait,
            }
        };

        match action {
            PingAction::Wait => {}
            PingAction::SendPing => {
                tracing::debug!("sending PINGREQ");
                if let Err(err) = core.send(&Packet::PingReq).await {
                    tracing::debug!("keepalive send failed: {err}");
                    break;
                }
            }
            PingAction::MissingPong => {
                tracing::error!("no PINGRESP within the keepalive window");
                core.cleanup(Some(MqttError::MissingPong), TaskKind::Keepalive)
                    .await;
                break;
            }
        }
    }

    tracing::debug!("keepalive task exited");
}
