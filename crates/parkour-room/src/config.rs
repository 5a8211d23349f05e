//! Session configuration and the match phase state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Settings for one session type. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Exact number of participants required to start, and the most
    /// that can be admitted.
    pub capacity: usize,

    /// Delay between "everyone is ready" and the match starting.
    pub start_delay: Duration,

    /// Length of a match in countdown ticks.
    pub round_duration_secs: u32,

    /// Interval of the countdown tick.
    pub tick_period: Duration,

    /// Remaining-seconds values at which a time warning is broadcast.
    pub warning_thresholds: Vec<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 2,
            start_delay: Duration::from_secs(2),
            round_duration_secs: 180,
            tick_period: Duration::from_secs(1),
            warning_thresholds: vec![60, 30, 10],
        }
    }
}

impl SessionConfig {
    /// A default config for a session of `capacity` players.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to run.
    ///
    /// - `capacity` is at least 1.
    /// - `tick_period` is at least 1 ms.
    /// - thresholds are deduplicated and sorted descending. Zero, and any
    ///   threshold not below `round_duration_secs`, is dropped.
    pub fn validated(mut self) -> Self {
        if self.capacity == 0 {
            tracing::warn!("capacity 0 is not playable, using 1");
            self.capacity = 1;
        }
        if self.tick_period.is_zero() {
            tracing::warn!("tick_period 0 would spin, using 1ms");
            self.tick_period = Duration::from_millis(1);
        }
        let round = self.round_duration_secs;
        self.warning_thresholds.retain(|&t| t > 0 && t < round);
        self.warning_thresholds.sort_unstable_by(|a, b| b.cmp(a));
        self.warning_thresholds.dedup();
        self
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a session is in its lifecycle.
///
/// ```text
/// Lobby → CountdownToStart → InProgress → Ended
///   ↑            │
///   └────────────┘  (readiness lost before the countdown fires)
/// ```
///
/// `Ended` is terminal for the match instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Lobby,
    CountdownToStart,
    InProgress,
    Ended,
}

impl Phase {
    /// Only the lobby admits new participants.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Before the match starts, readiness changes are re-evaluated.
    pub fn is_pre_match(&self) -> bool {
        matches!(self, Self::Lobby | Self::CountdownToStart)
    }

    /// The forward successor, or `None` for `Ended`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Lobby => Some(Self::CountdownToStart),
            Self::CountdownToStart => Some(Self::InProgress),
            Self::InProgress => Some(Self::Ended),
            Self::Ended => None,
        }
    }

    /// Whether moving to `target` is allowed: the forward step, or a
    /// countdown falling back to the lobby.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target) || (self == Self::CountdownToStart && target == Self::Lobby)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Lobby => "Lobby",
            Self::CountdownToStart => "CountdownToStart",
            Self::InProgress => "InProgress",
            Self::Ended => "Ended",
        };
        f.write_str(name)
    }
}
