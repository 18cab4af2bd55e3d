//! Debounced call-state tracker.
//!
//! Filters the raw notification stream down to confirmed transitions.
//! Entering `Connected` (or `Ringing`) is provisional until no contradicting
//! notification arrives for the quiet window; entering `Idle` is confirmed
//! at once so that a redial is never delayed.
//!
//! ```text
//!   event(s != confirmed)          window elapsed
//!  ───────────────────────► Pending ─────────────► Confirmed(s)
//!                              │
//!            event(other)      │ supersedes candidate, restarts window
//!            event(idle)       │ cancels candidate, confirms Idle
//! ```
//!
//! The tracker owns no timer of its own. It exposes the deadline of the
//! single pending candidate and the owner calls [`DebouncedTracker::poll`]
//! once that deadline is reached.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::call::{CallEvent, CallState};

/// Outcome of feeding one event (or one deadline) through the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TrackerDecision {
    ConnectedConfirmed,
    RingingConfirmed,
    /// The line went idle after some non-idle activity.
    /// `was_connected` is true if a connected state was observed since the
    /// previous idle, even one that never survived the debounce window.
    IdleConfirmed { was_connected: bool },
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    state: CallState,
    sequence: u64,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct DebouncedTracker {
    window: Duration,
    confirmed: CallState,
    pending: Option<Pending>,
    connected_seen: bool,
}

impl DebouncedTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            confirmed: CallState::Idle,
            pending: None,
            connected_seen: false,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Last confirmed state.
    pub fn confirmed(&self) -> CallState {
        self.confirmed
    }

    /// State of the provisional candidate, if one is waiting out its window.
    pub fn pending(&self) -> Option<CallState> {
        self.pending.map(|p| p.state)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Feed one raw event. Events must be supplied in arrival order.
    pub fn observe(&mut self, event: &CallEvent) -> TrackerDecision {
        match event.state {
            CallState::Idle => self.observe_idle(event.sequence),
            state => self.observe_active(state, event.sequence, event.received),
        }
    }

    /// Confirm the pending candidate if its quiet window has elapsed by `now`.
    pub fn poll(&mut self, now: Instant) -> TrackerDecision {
        self.poll_confirmed(now)
            .map_or(TrackerDecision::Ignored, |(decision, _)| decision)
    }

    /// Like [`poll`](Self::poll), but also returns the instant the quiet
    /// window ended, which is earlier than `now` when polled late.
    pub fn poll_confirmed(&mut self, now: Instant) -> Option<(TrackerDecision, Instant)> {
        let pending = self.pending.filter(|p| p.deadline <= now)?;
        self.pending = None;
        tracing::debug!(
            sequence = pending.sequence,
            state = %pending.state,
            late_ms = now.duration_since(pending.deadline).as_millis() as u64,
            "debounce window elapsed"
        );
        Some((self.confirm(pending.state), pending.deadline))
    }

    /// Drop any candidate and return to the initial idle state.
    pub fn reset(&mut self) {
        self.confirmed = CallState::Idle;
        self.pending = None;
        self.connected_seen = false;
    }

    fn observe_idle(&mut self, sequence: u64) -> TrackerDecision {
        let in_call = self.confirmed != CallState::Idle || self.pending.is_some();
        if let Some(cancelled) = self.pending.take() {
            tracing::debug!(
                sequence,
                cancelled = %cancelled.state,
                "idle cancelled provisional state"
            );
        }
        if !in_call {
            return TrackerDecision::Ignored;
        }
        let was_connected = self.connected_seen;
        self.confirmed = CallState::Idle;
        self.connected_seen = false;
        TrackerDecision::IdleConfirmed { was_connected }
    }

    fn observe_active(&mut self, state: CallState, sequence: u64, at: Instant) -> TrackerDecision {
        if state == CallState::Connected {
            self.connected_seen = true;
        }

        // A repeat of the waiting candidate keeps its original deadline.
        if self.pending.is_some_and(|p| p.state == state) {
            return TrackerDecision::Ignored;
        }

        if state == self.confirmed {
            self.pending = None;
            return TrackerDecision::Ignored;
        }

        if self.window.is_zero() {
            self.pending = None;
            return self.confirm(state);
        }

        if let Some(superseded) = self.pending.replace(Pending {
            state,
            sequence,
            deadline: at + self.window,
        }) {
            tracing::debug!(
                sequence,
                superseded = %superseded.state,
                candidate = %state,
                "provisional state superseded"
            );
        }
        TrackerDecision::Ignored
    }

    fn confirm(&mut self, state: CallState) -> TrackerDecision {
        self.confirmed = state;
        match state {
            CallState::Connected => TrackerDecision::ConnectedConfirmed,
            CallState::Ringing => TrackerDecision::RingingConfirmed,
            CallState::Idle => TrackerDecision::IdleConfirmed {
                was_connected: std::mem::take(&mut self.connected_seen),
            },
        }
    }
}
