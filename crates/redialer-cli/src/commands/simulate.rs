//! Virtual-time replay of a call-state script.
//!
//! Script format, one step per line:
//!
//! ```text
//! # millis  input
//! 0         connected
//! 1000      idle
//! 250000    stop-alert
//! ```
//!
//! Times are offsets from the start and must not decrease. Every deadline
//! that falls between two steps fires at its exact virtual time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use redialer_core::{Automaton, CallEvent, CallState, Command, Event};
use serde::Serialize;
use tokio::time::Instant;

use super::{resolve_settings, AutomatonArgs, Input};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Script file, or `-` for stdin
    pub script: PathBuf,
    #[command(flatten)]
    pub automaton: AutomatonArgs,
    /// Keep running deadlines until this virtual time (ms)
    #[arg(long)]
    pub until: Option<u64>,
    /// Print automaton events as well as commands
    #[arg(long)]
    pub events: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub at_ms: u64,
    pub input: Input,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Output<'a> {
    Command {
        at_ms: u64,
        #[serde(flatten)]
        command: &'a Command,
    },
    Event {
        at_ms: u64,
        event: &'a Event,
    },
    Status {
        at_ms: u64,
        status: redialer_core::Status,
    },
}

pub fn parse_script(text: &str) -> Result<Vec<Step>, String> {
    let mut steps = Vec::new();
    let mut last = 0;
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(at), Some(word), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("line {}: expected '<millis> <input>'", lineno + 1));
        };
        let at_ms: u64 = at
            .parse()
            .map_err(|_| format!("line {}: bad time '{at}'", lineno + 1))?;
        if at_ms < last {
            return Err(format!("line {}: time goes backwards ({at_ms} < {last})", lineno + 1));
        }
        last = at_ms;
        let input = Input::parse(word)
            .map_err(|e| format!("line {}: {e}", lineno + 1))?
            .ok_or_else(|| format!("line {}: missing input", lineno + 1))?;
        steps.push(Step { at_ms, input });
    }
    Ok(steps)
}

pub fn run(args: SimulateArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let text = if args.script.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        std::fs::read_to_string(&args.script)?
    };
    let steps = parse_script(&text)?;
    let (_, settings) = resolve_settings(config_path, &args.automaton)?;

    let mut replay = Replay::new(Automaton::new(settings), args.events);
    replay.start();
    for step in &steps {
        replay.advance_to(step.at_ms);
        match step.input {
            Input::State(state) => replay.observe(state),
            Input::Code(code) => match CallState::from_code(code) {
                Some(state) => replay.observe(state),
                None => tracing::warn!(code, at_ms = step.at_ms, "unrecognized call state code ignored"),
            },
            Input::StopAlert => {
                let commands = replay.automaton.stop_alert();
                replay.emit(&commands);
            }
            Input::Status => replay.status(),
            Input::Stop => {
                let commands = replay.automaton.shutdown();
                replay.emit(&commands);
                break;
            }
        }
    }
    if let Some(until) = args.until {
        replay.advance_to(until);
    }
    Ok(())
}

struct Replay {
    automaton: Automaton,
    t0: Instant,
    now_ms: u64,
    sequence: u64,
    show_events: bool,
}

impl Replay {
    fn new(automaton: Automaton, show_events: bool) -> Self {
        Self {
            automaton,
            t0: Instant::now(),
            now_ms: 0,
            sequence: 0,
            show_events,
        }
    }

    fn instant(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn start(&mut self) {
        let commands = self.automaton.start();
        self.emit(&commands);
    }

    /// Fire every deadline up to and including `at_ms`.
    fn advance_to(&mut self, at_ms: u64) {
        let target = self.instant(at_ms);
        while let Some(deadline) = self.automaton.next_deadline() {
            if deadline > target {
                break;
            }
            self.now_ms = deadline.duration_since(self.t0).as_millis() as u64;
            let commands = self.automaton.poll(deadline);
            self.emit(&commands);
        }
        self.now_ms = self.now_ms.max(at_ms);
    }

    fn observe(&mut self, state: CallState) {
        self.sequence += 1;
        let event = CallEvent::new(self.sequence, state, self.instant(self.now_ms));
        let commands = self.automaton.handle(&event);
        self.emit(&commands);
    }

    fn status(&mut self) {
        let status = self.automaton.status(self.instant(self.now_ms));
        self.print(&Output::Status {
            at_ms: self.now_ms,
            status,
        });
    }

    fn emit(&mut self, commands: &[Command]) {
        let events = self.automaton.drain_events();
        if self.show_events {
            for event in &events {
                self.print(&Output::Event {
                    at_ms: self.now_ms,
                    event,
                });
            }
        }
        for command in commands {
            self.print(&Output::Command {
                at_ms: self.now_ms,
                command,
            });
        }
    }

    fn print(&self, output: &Output<'_>) {
        match serde_json::to_string(output) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::error!(error = %err, "failed to encode output"),
        }
    }
}
