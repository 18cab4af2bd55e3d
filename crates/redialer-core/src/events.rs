use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::automaton::Phase;
use crate::call::CallState;
use crate::sink::Command;
use crate::tracker::TrackerDecision;

/// Every observable step of the automaton produces an Event.
/// Subscribers receive them in processing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MonitorStarted {
        target_number: String,
        at: DateTime<Utc>,
    },
    MonitorStopped {
        at: DateTime<Utc>,
    },
    /// Raw notification accepted from the event source.
    StateObserved {
        sequence: u64,
        state: CallState,
        at: DateTime<Utc>,
    },
    /// Platform code outside the known set; dropped.
    StateCodeRejected {
        code: i32,
        at: DateTime<Utc>,
    },
    /// Tracker confirmed a transition and the automaton moved.
    TransitionConfirmed {
        decision: TrackerDecision,
        from: Phase,
        to: Phase,
        at: DateTime<Utc>,
    },
    AlertArmed {
        countdown: u64,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    AlertCancelled {
        countdown: u64,
        at: DateTime<Utc>,
    },
    AlertFired {
        countdown: u64,
        at: DateTime<Utc>,
    },
    CommandIssued {
        command: Command,
        at: DateTime<Utc>,
    },
    /// The sink reported an error. Not retried.
    CommandFailed {
        command: Command,
        error: String,
        at: DateTime<Utc>,
    },
}
