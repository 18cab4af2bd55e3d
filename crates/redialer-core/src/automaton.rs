//! Call automaton.
//!
//! Composes the debounced tracker, the alert timer and the redial
//! controller into one synchronous state machine. Time is supplied by the
//! caller, which makes the automaton usable both under the async
//! [`Monitor`](crate::monitor::Monitor) and for virtual-time replay.
//!
//! ## Phases
//!
//! ```text
//!  Idle ──ringing──► Ringing ──connected──► Connected   [arm alert]
//!  Idle ──────────────connected───────────► Connected   [arm alert]
//!  Ringing ──idle──► Idle                               [redial in any-idle mode]
//!  Connected ──idle──► Idle                             [cancel alert, redial]
//!  Connected ──ringing──► Ringing                       [cancel alert]
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut automaton = Automaton::new(settings);
//! let commands = automaton.handle(&event);
//! // when automaton.next_deadline() is reached:
//! let commands = automaton.poll(now);
//! ```

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::alert::AlertTimer;
use crate::call::{CallEvent, CallState};
use crate::events::Event;
use crate::redial::{RedialController, RedialMode, TargetNumber};
use crate::sink::Command;
use crate::tracker::{DebouncedTracker, TrackerDecision};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(3_000);
pub const DEFAULT_ALERT_DELAY: Duration = Duration::from_millis(240_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Ringing,
    Connected,
}

/// Validated runtime parameters, fixed for the life of an automaton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub target: TargetNumber,
    pub debounce: Duration,
    pub alert_delay: Duration,
    pub mode: RedialMode,
    /// Place a call as soon as monitoring starts.
    pub dial_on_start: bool,
}

impl Settings {
    pub fn new(target: TargetNumber) -> Self {
        Self {
            target,
            debounce: DEFAULT_DEBOUNCE,
            alert_delay: DEFAULT_ALERT_DELAY,
            mode: RedialMode::default(),
            dial_on_start: false,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_alert_delay(mut self, alert_delay: Duration) -> Self {
        self.alert_delay = alert_delay;
        self
    }

    pub fn with_mode(mut self, mode: RedialMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dial_on_start(mut self, dial_on_start: bool) -> Self {
        self.dial_on_start = dial_on_start;
        self
    }
}

/// Point-in-time view of the automaton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub phase: Phase,
    pub pending: Option<CallState>,
    pub alert_armed: bool,
    pub alert_active: bool,
    pub alert_remaining_ms: Option<u64>,
    pub redial_armed: bool,
    pub dials_issued: u64,
    pub alerts_played: u64,
}

#[derive(Debug)]
pub struct Automaton {
    settings: Settings,
    tracker: DebouncedTracker,
    alert: AlertTimer,
    redial: RedialController,
    phase: Phase,
    alerts_played: u64,
    stopped: bool,
    outbox: Vec<Event>,
}

impl Automaton {
    pub fn new(settings: Settings) -> Self {
        Self {
            tracker: DebouncedTracker::new(settings.debounce),
            alert: AlertTimer::new(settings.alert_delay),
            redial: RedialController::new(settings.target.clone(), settings.mode),
            phase: Phase::Idle,
            alerts_played: 0,
            stopped: false,
            outbox: Vec::new(),
            settings,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn alert(&self) -> &AlertTimer {
        &self.alert
    }

    /// Earliest instant at which [`Automaton::poll`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.tracker.next_deadline(), self.alert.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn status(&self, now: Instant) -> Status {
        Status {
            phase: self.phase,
            pending: self.tracker.pending(),
            alert_armed: self.alert.is_armed(),
            alert_active: self.alert.is_active(),
            alert_remaining_ms: self.alert.remaining(now).map(|d| d.as_millis() as u64),
            redial_armed: self.redial.is_armed(),
            dials_issued: self.redial.dials_issued(),
            alerts_played: self.alerts_played,
        }
    }

    /// Take the events produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Called once when monitoring begins.
    pub fn start(&mut self) -> Vec<Command> {
        self.emit(Event::MonitorStarted {
            target_number: self.settings.target.to_string(),
            at: Utc::now(),
        });
        if self.settings.dial_on_start {
            let dial = self.redial.dial_now();
            return self.issue(dial);
        }
        Vec::new()
    }

    /// Process one raw call-state event.
    pub fn handle(&mut self, event: &CallEvent) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }
        // Deadlines that passed before this event arrived take effect first.
        let mut commands = self.poll(event.received);

        tracing::debug!(sequence = event.sequence, state = %event.state, "call state observed");
        self.emit(Event::StateObserved {
            sequence: event.sequence,
            state: event.state,
            at: event.observed_at,
        });

        let decision = self.tracker.observe(event);
        commands.extend(self.apply(decision, event.received));
        commands
    }

    /// Fire whatever deadlines have been reached by `now`.
    ///
    /// A late poll behaves as if it had happened on time: a debounce
    /// confirmation takes effect at the end of its quiet window, and an
    /// alert that became due in the meantime fires in the same call.
    pub fn poll(&mut self, now: Instant) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }
        let (decision, confirmed_at) = match self.tracker.poll_confirmed(now) {
            Some((decision, at)) => (decision, at),
            None => (TrackerDecision::Ignored, now),
        };
        let mut commands = self.apply(decision, confirmed_at);

        if let Some(countdown) = self.alert.poll(now) {
            tracing::info!(countdown = countdown.id, "call exceeded alert delay");
            self.alerts_played += 1;
            self.emit(Event::AlertFired {
                countdown: countdown.id,
                at: Utc::now(),
            });
            commands.extend(self.issue(Some(Command::PlayAlert)));
        }
        commands
    }

    /// External request to silence a sounding alert. No-op otherwise.
    pub fn stop_alert(&mut self) -> Vec<Command> {
        if self.stopped || !self.alert.acknowledge() {
            return Vec::new();
        }
        self.issue(Some(Command::StopAlert))
    }

    /// Tear down: cancel timers, disarm redial, release any sounding alert.
    /// Every later call is a no-op.
    pub fn shutdown(&mut self) -> Vec<Command> {
        if self.stopped {
            return Vec::new();
        }
        self.cancel_alert();
        self.tracker.reset();
        self.redial.disarm();
        let commands = if self.alert.acknowledge() {
            self.issue(Some(Command::StopAlert))
        } else {
            Vec::new()
        };
        self.phase = Phase::Idle;
        self.stopped = true;
        self.emit(Event::MonitorStopped { at: Utc::now() });
        commands
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn apply(&mut self, decision: TrackerDecision, now: Instant) -> Vec<Command> {
        let from = self.phase;
        let to = match decision {
            TrackerDecision::Ignored => return Vec::new(),
            TrackerDecision::ConnectedConfirmed => Phase::Connected,
            TrackerDecision::RingingConfirmed => Phase::Ringing,
            TrackerDecision::IdleConfirmed { .. } => Phase::Idle,
        };
        tracing::info!(?decision, ?from, ?to, "transition confirmed");
        self.emit(Event::TransitionConfirmed {
            decision,
            from,
            to,
            at: Utc::now(),
        });
        self.phase = to;

        match decision {
            TrackerDecision::ConnectedConfirmed => {
                let countdown = self.alert.arm(now);
                self.emit(Event::AlertArmed {
                    countdown: countdown.id,
                    delay_ms: self.settings.alert_delay.as_millis() as u64,
                    at: Utc::now(),
                });
                Vec::new()
            }
            TrackerDecision::RingingConfirmed => {
                if from == Phase::Connected {
                    self.cancel_alert();
                }
                Vec::new()
            }
            TrackerDecision::IdleConfirmed { was_connected } => {
                self.cancel_alert();
                let dial = self.redial.on_idle(was_connected);
                self.issue(dial)
            }
            TrackerDecision::Ignored => Vec::new(),
        }
    }

    fn cancel_alert(&mut self) {
        if let Some(countdown) = self.alert.cancel() {
            tracing::debug!(countdown = countdown.id, "alert countdown cancelled");
            self.emit(Event::AlertCancelled {
                countdown: countdown.id,
                at: Utc::now(),
            });
        }
    }

    fn issue(&mut self, command: Option<Command>) -> Vec<Command> {
        let Some(command) = command else {
            return Vec::new();
        };
        tracing::info!(?command, "command issued");
        self.emit(Event::CommandIssued {
            command: command.clone(),
            at: Utc::now(),
        });
        vec![command]
    }

    fn emit(&mut self, event: Event) {
        self.outbox.push(event);
    }
}
