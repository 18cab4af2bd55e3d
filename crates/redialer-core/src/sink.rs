//! Outbound commands and the sink that executes them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::SinkError;
use crate::redial::TargetNumber;

/// Side effect requested by the automaton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Dial { number: TargetNumber },
    PlayAlert,
    StopAlert,
}

/// Platform side of the automaton: places calls and plays audio.
///
/// Calls are fire-and-forget. A returned error is logged and reported as an
/// event; the automaton never retries.
pub trait CommandSink: Send + Sync {
    fn dial(&self, number: &TargetNumber) -> Result<(), SinkError>;

    fn play_alert(&self) -> Result<(), SinkError>;

    fn stop_alert(&self) -> Result<(), SinkError>;

    fn execute(&self, command: &Command) -> Result<(), SinkError> {
        match command {
            Command::Dial { number } => self.dial(number),
            Command::PlayAlert => self.play_alert(),
            Command::StopAlert => self.stop_alert(),
        }
    }
}

/// In-memory sink that records every command with the time it arrived.
#[derive(Debug, Default)]
pub struct RecordingSink {
    log: Mutex<Vec<(Instant, Command)>>,
    reject_dials: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose dial attempts are recorded and then rejected.
    pub fn rejecting_dials() -> Self {
        Self {
            reject_dials: true,
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<Command> {
        self.entries().into_iter().map(|(_, c)| c).collect()
    }

    pub fn entries(&self) -> Vec<(Instant, Command)> {
        self.log().clone()
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, command: Command) {
        self.log().push((Instant::now(), command));
    }

    // A panicking test thread must not erase what was already recorded.
    fn log(&self) -> MutexGuard<'_, Vec<(Instant, Command)>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandSink for RecordingSink {
    fn dial(&self, number: &TargetNumber) -> Result<(), SinkError> {
        self.record(Command::Dial {
            number: number.clone(),
        });
        if self.reject_dials {
            return Err(SinkError::Rejected(format!("dial {number} rejected")));
        }
        Ok(())
    }

    fn play_alert(&self) -> Result<(), SinkError> {
        self.record(Command::PlayAlert);
        Ok(())
    }

    fn stop_alert(&self) -> Result<(), SinkError> {
        self.record(Command::StopAlert);
        Ok(())
    }
}
