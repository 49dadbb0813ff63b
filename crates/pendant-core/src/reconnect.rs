use crate::connection::ConnectionState;
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_RECONNECT_INTERVAL_MS: i64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Nothing to do this tick.
    Idle,
    /// First disconnected tick; the backoff window starts now.
    Armed,
    /// Still inside the backoff window.
    Waiting,
    /// Window elapsed; the caller should open a fresh channel.
    Connect,
}

/// Clock-driven reconnect policy. Keeps at least `interval` between the tick
/// that arms the window and the tick that issues the connect.
#[derive(Debug, Clone)]
pub struct ReconnectScheduler {
    interval: Duration,
    last_attempt: Option<DateTime<Utc>>,
}

impl Default for ReconnectScheduler {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_RECONNECT_INTERVAL_MS))
    }
}

impl ReconnectScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_attempt: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_attempt(&self) -> Option<DateTime<Utc>> {
        self.last_attempt
    }

    pub fn on_clock(&mut self, state: ConnectionState, now: DateTime<Utc>) -> ReconnectDecision {
        if state.is_open() {
            self.last_attempt = None;
            return ReconnectDecision::Idle;
        }

        let Some(armed_at) = self.last_attempt else {
            self.last_attempt = Some(now);
            return ReconnectDecision::Armed;
        };

        if now.signed_duration_since(armed_at) >= self.interval {
            self.last_attempt = None;
            ReconnectDecision::Connect
        } else {
            ReconnectDecision::Waiting
        }
    }
}
