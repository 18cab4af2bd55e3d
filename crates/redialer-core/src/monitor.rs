//! Async monitoring session.
//!
//! A [`Monitor`] owns the lifecycle (`configure`, `start`, `stop`). Once
//! started, a single tokio task owns the [`Automaton`] and is the only code
//! that touches it. Notifications from any thread are funnelled through an
//! unbounded channel, so they are handled strictly in arrival order, and the
//! task sleeps until either the next notification or the automaton's next
//! deadline. Shutdown travels on its own channel and overtakes anything
//! still queued.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::automaton::{Automaton, Settings, Status};
use crate::call::{CallEvent, CallState};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::sink::{Command, CommandSink};

const EVENT_CAPACITY: usize = 256;

enum Input {
    State { state: CallState, received: Instant },
    StopAlert,
    Status(oneshot::Sender<Status>),
}

/// Cloneable entry point for the event source and for UI actions.
#[derive(Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<Input>,
    events: broadcast::Sender<Event>,
}

impl MonitorHandle {
    /// Deliver a call-state notification.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotRunning`] once the monitor has stopped; the
    /// notification is discarded.
    pub fn on_call_state_changed(&self, state: CallState) -> Result<()> {
        self.send(Input::State {
            state,
            received: Instant::now(),
        })
    }

    /// Deliver a raw platform state code. Unknown codes are logged and
    /// dropped without touching the automaton.
    pub fn on_state_code(&self, code: i32) -> Result<()> {
        match CallState::from_code(code) {
            Some(state) => self.on_call_state_changed(state),
            None => {
                if self.tx.is_closed() {
                    return Err(CoreError::NotRunning);
                }
                tracing::warn!(code, "unrecognized call state code ignored");
                let _ = self.events.send(Event::StateCodeRejected {
                    code,
                    at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Silence a sounding alert.
    pub fn stop_alert(&self) -> Result<()> {
        self.send(Input::StopAlert)
    }

    pub async fn status(&self) -> Result<Status> {
        let (reply, rx) = oneshot::channel();
        self.send(Input::Status(reply))?;
        rx.await.map_err(|_| CoreError::NotRunning)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, input: Input) -> Result<()> {
        self.tx.send(input).map_err(|_| CoreError::NotRunning)
    }
}

struct Running {
    handle: MonitorHandle,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Lifecycle owner of one monitoring session at a time.
///
/// Dropping a running `Monitor` ends its session as if `stop` had been
/// called, without waiting for the task.
#[derive(Default)]
pub struct Monitor {
    settings: Option<Settings>,
    running: Option<Running>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the parameters for the next `start`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyRunning`] while a session is active.
    pub fn configure(&mut self, settings: Settings) -> Result<()> {
        if self.is_running() {
            return Err(CoreError::AlreadyRunning);
        }
        self.settings = Some(settings);
        Ok(())
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.handle.is_running())
    }

    pub fn handle(&self) -> Option<MonitorHandle> {
        self.running.as_ref().map(|r| r.handle.clone())
    }

    /// Spawn the processing task. Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotConfigured`] before `configure`,
    /// [`CoreError::AlreadyRunning`] if a session is active. The active
    /// session is left untouched.
    pub fn start(&mut self, sink: Arc<dyn CommandSink>) -> Result<MonitorHandle> {
        if self.is_running() {
            return Err(CoreError::AlreadyRunning);
        }
        let settings = self.settings.clone().ok_or(CoreError::NotConfigured)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = MonitorHandle {
            tx,
            events: events.clone(),
        };

        tracing::info!(
            number = %settings.target,
            debounce_ms = settings.debounce.as_millis() as u64,
            alert_delay_ms = settings.alert_delay.as_millis() as u64,
            mode = ?settings.mode,
            "monitor starting"
        );
        let task = tokio::spawn(run(Automaton::new(settings), rx, shutdown_rx, sink, events));
        self.running = Some(Running {
            handle: handle.clone(),
            shutdown,
            task,
        });
        Ok(handle)
    }

    /// Cancel outstanding timers, discard buffered notifications and wait
    /// for the processing task to exit. No-op when not running.
    ///
    /// Notifications sent before `stop` but not yet handled are dropped,
    /// so they can no longer place a call.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        // Err means the task already exited.
        let _ = running.shutdown.send(());
        if let Err(err) = running.task.await {
            tracing::error!(error = %err, "monitor task ended abnormally");
        }
        tracing::info!("monitor stopped");
        Ok(())
    }
}

async fn run(
    mut automaton: Automaton,
    mut rx: mpsc::UnboundedReceiver<Input>,
    mut shutdown: oneshot::Receiver<()>,
    sink: Arc<dyn CommandSink>,
    events: broadcast::Sender<Event>,
) {
    let mut sequence = 0u64;
    let commands = automaton.start();
    dispatch(&mut automaton, commands, sink.as_ref(), &events);

    loop {
        let deadline = automaton.next_deadline();
        tokio::select! {
            // Shutdown beats everything. Expired deadlines go before inputs
            // so that inputs see up-to-date state.
            biased;
            _ = &mut shutdown => {
                rx.close();
                let commands = automaton.shutdown();
                dispatch(&mut automaton, commands, sink.as_ref(), &events);
                break;
            }
            _ = sleep_until(deadline) => {
                let commands = automaton.poll(Instant::now());
                dispatch(&mut automaton, commands, sink.as_ref(), &events);
            }
            input = rx.recv() => {
                let Some(input) = input else {
                    // Every handle dropped without an explicit stop.
                    let commands = automaton.shutdown();
                    dispatch(&mut automaton, commands, sink.as_ref(), &events);
                    break;
                };
                match input {
                    Input::State { state, received } => {
                        sequence += 1;
                        let event = CallEvent::new(sequence, state, received);
                        let commands = automaton.handle(&event);
                        dispatch(&mut automaton, commands, sink.as_ref(), &events);
                    }
                    Input::StopAlert => {
                        let commands = automaton.stop_alert();
                        dispatch(&mut automaton, commands, sink.as_ref(), &events);
                    }
                    Input::Status(reply) => {
                        let _ = reply.send(automaton.status(Instant::now()));
                    }
                }
            }
        }
    }
    // Dropping the receiver here discards anything still queued.
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Publish the automaton's events, then hand each command to the sink once.
fn dispatch(
    automaton: &mut Automaton,
    commands: Vec<Command>,
    sink: &dyn CommandSink,
    events: &broadcast::Sender<Event>,
) {
    for event in automaton.drain_events() {
        let _ = events.send(event);
    }
    for command in commands {
        if let Err(err) = sink.execute(&command) {
            tracing::warn!(?command, error = %err, "command sink failed");
            let _ = events.send(Event::CommandFailed {
                command,
                error: err.to_string(),
                at: Utc::now(),
            });
        }
    }
}
