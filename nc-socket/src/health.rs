//! Application-level liveness tracking for ping/pong probes.
//!
//! A missing pong is a soft signal only: the tracker reports `Stale`, but
//! nothing here closes the connection.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Liveness as judged from the most recent ping/pong exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// No probe has completed or expired yet.
    Unknown,
    /// A pong arrived, and no later ping has outlived the timeout.
    Alive,
    /// The latest ping went unanswered for longer than the timeout.
    Stale,
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Alive => write!(f, "alive"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Records ping and pong times for one client.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    pong_timeout: Duration,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
    last_pong_at: Option<DateTime<Utc>>,
    last_round_trip: Option<Duration>,
    missed_pongs: u32,
}

impl LivenessTracker {
    pub fn new(pong_timeout: Duration) -> Self {
        Self {
            pong_timeout,
            last_ping: None,
            last_pong: None,
            last_pong_at: None,
            last_round_trip: None,
            missed_pongs: 0,
        }
    }

    /// Record a ping sent at `now`.
    pub fn record_ping(&mut self, now: Instant) {
        if self.ping_outstanding() {
            self.missed_pongs += 1;
        }
        self.last_ping = Some(now);
    }

    /// Record a pong received at `now`.
    pub fn record_pong(&mut self, now: Instant) {
        if let Some(ping) = self.last_ping.filter(|_| self.ping_outstanding()) {
            self.last_round_trip = Some(now.saturating_duration_since(ping));
        }
        self.last_pong = Some(now);
        self.last_pong_at = Some(Utc::now());
        self.missed_pongs = 0;
    }

    fn ping_outstanding(&self) -> bool {
        match (self.last_ping, self.last_pong) {
            (Some(ping), Some(pong)) => ping > pong,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Liveness as of `now`.
    pub fn status_at(&self, now: Instant) -> Liveness {
        if let Some(ping) = self.last_ping.filter(|_| self.ping_outstanding()) {
            if now.saturating_duration_since(ping) > self.pong_timeout {
                return Liveness::Stale;
            }
        }
        if self.last_pong.is_some() {
            Liveness::Alive
        } else {
            Liveness::Unknown
        }
    }

    /// Liveness right now.
    pub fn status(&self) -> Liveness {
        self.status_at(Instant::now())
    }

    /// Wall-clock time of the last pong.
    pub fn last_pong_at(&self) -> Option<DateTime<Utc>> {
        self.last_pong_at
    }

    /// Time between the last answered ping and its pong.
    pub fn last_round_trip(&self) -> Option<Duration> {
        self.last_round_trip
    }

    /// Pings superseded by a newer ping before being answered.
    pub fn missed_pongs(&self) -> u32 {
        self.missed_pongs
    }

    /// Forget all probe history, e.g. after reconnecting.
    pub fn reset(&mut self) {
        *self = Self::new(self.pong_timeout);
    }
}
