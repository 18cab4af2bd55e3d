//! Call-state values as delivered by the platform.
//!
//! The platform reports one of three telephony conditions. Android encodes
//! them as small integers (`CALL_STATE_IDLE = 0`, `CALL_STATE_RINGING = 1`,
//! `CALL_STATE_OFFHOOK = 2`); any other code is an anomaly that the
//! automaton logs and ignores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// No call in progress.
    Idle,
    /// Inbound call signalling.
    Ringing,
    /// Call answered or being placed (off-hook).
    Connected,
}

impl CallState {
    pub const ALL: [CallState; 3] = [CallState::Idle, CallState::Ringing, CallState::Connected];

    /// Map a raw platform state code. Returns `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CallState::Idle),
            1 => Some(CallState::Ringing),
            2 => Some(CallState::Connected),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            CallState::Idle => 0,
            CallState::Ringing => 1,
            CallState::Connected => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a textual call state cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized call state: {0}")]
pub struct UnknownCallState(pub String);

impl FromStr for CallState {
    type Err = UnknownCallState;

    /// Accepts state names (`offhook` is an alias for `connected`) or the
    /// numeric platform codes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "idle" => Ok(CallState::Idle),
            "ringing" => Ok(CallState::Ringing),
            "connected" | "offhook" => Ok(CallState::Connected),
            other => other
                .parse::<i32>()
                .ok()
                .and_then(CallState::from_code)
                .ok_or_else(|| UnknownCallState(trimmed.to_string())),
        }
    }
}

/// One raw notification from the event source.
///
/// `sequence` is assigned in arrival order by whoever serializes the stream
/// and only ever appears in diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    pub sequence: u64,
    pub state: CallState,
    pub observed_at: DateTime<Utc>,
    /// Monotonic receipt time used for debounce arithmetic.
    #[serde(skip, default = "Instant::now")]
    pub received: Instant,
}

impl CallEvent {
    pub fn new(sequence: u64, state: CallState, received: Instant) -> Self {
        Self {
            sequence,
            state,
            observed_at: Utc::now(),
            received,
        }
    }
}
