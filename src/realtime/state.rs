//! Connection state machine and attempt accounting.
//!
//! # Data Flow
//! ```text
//! Disconnected ──connect()──▶ Connecting ──CONNECTED──▶ Connected
//!      ▲                          │                         │
//!      │      attempt failed:     │                         │ link lost
//!      │      advance candidate   │                         ▼
//!      └──── passes exhausted ◀───┘◀──────────────── Connecting (next candidate)
//! ```
//!
//! # Design Decisions
//! - The candidate index always advances by one on a failed attempt
//! - `reconnect_attempts` counts completed passes over the candidate list
//! - A connect is rejected once `max_reconnect_attempts` passes complete,
//!   so the total number of attempts is `max_reconnect_attempts * candidates`

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Disconnected => "disconnected",
            Phase::Connecting => "connecting",
            Phase::Connected => "connected",
        })
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Try again against `next_index` after the retry delay.
    Retry { next_index: usize },
    /// Give up; `attempts` connection attempts were made in total.
    Rejected { attempts: usize },
}

/// Snapshot of the realtime session published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub phase: Phase,
    pub candidate_index: usize,
    pub reconnect_attempts: u32,
    /// Address of the live server while connected.
    pub endpoint: Option<String>,
    #[serde(skip)]
    tried_in_pass: usize,
    #[serde(skip)]
    total_attempts: usize,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Disconnected,
            candidate_index: 0,
            reconnect_attempts: 0,
            endpoint: None,
            tried_in_pass: 0,
            total_attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    /// Start a connect cycle at `start_index`.
    pub fn begin(&mut self, start_index: usize) {
        self.phase = Phase::Connecting;
        self.candidate_index = start_index;
        self.reconnect_attempts = 0;
        self.endpoint = None;
        self.tried_in_pass = 0;
        self.total_attempts = 0;
    }

    pub fn on_connected(&mut self, endpoint: &str) {
        self.phase = Phase::Connected;
        self.reconnect_attempts = 0;
        self.endpoint = Some(endpoint.to_string());
        self.tried_in_pass = 0;
        self.total_attempts = 0;
    }

    /// Record a failed attempt against the current candidate.
    pub fn on_attempt_failed(&mut self, candidates: usize, max_passes: u32) -> AttemptOutcome {
        let candidates = candidates.max(1);
        self.total_attempts += 1;
        self.tried_in_pass += 1;
        self.candidate_index = (self.candidate_index + 1) % candidates;

        if self.tried_in_pass >= candidates {
            self.tried_in_pass = 0;
            self.reconnect_attempts += 1;
        }

        if self.reconnect_attempts >= max_passes {
            AttemptOutcome::Rejected {
                attempts: self.total_attempts,
            }
        } else {
            AttemptOutcome::Retry {
                next_index: self.candidate_index,
            }
        }
    }

    /// Return to Disconnected. The candidate index is kept.
    pub fn reset(&mut self) {
        self.phase = Phase::Disconnected;
        self.reconnect_attempts = 0;
        self.endpoint = None;
        self.tried_in_pass = 0;
        self.total_attempts = 0;
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
