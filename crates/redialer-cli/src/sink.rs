//! Command sinks for the CLI.

use std::io::Write;
use std::process::{Child, Command as Process, Stdio};
use std::sync::Mutex;

use chrono::Utc;
use redialer_core::{Command, CommandSink, CommandsConfig, SinkError, TargetNumber};
use serde::Serialize;

/// Prints every command to stdout as one JSON line.
#[derive(Debug, Default)]
pub struct JsonSink;

#[derive(Serialize)]
struct JsonLine<'a> {
    at: chrono::DateTime<Utc>,
    #[serde(flatten)]
    command: &'a Command,
}

impl JsonSink {
    fn print(&self, command: &Command) -> Result<(), SinkError> {
        let line = serde_json::to_string(&JsonLine {
            at: Utc::now(),
            command,
        })
        .map_err(|e| SinkError::Rejected(e.to_string()))?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}

impl CommandSink for JsonSink {
    fn dial(&self, number: &TargetNumber) -> Result<(), SinkError> {
        self.print(&Command::Dial {
            number: number.clone(),
        })
    }

    fn play_alert(&self) -> Result<(), SinkError> {
        self.print(&Command::PlayAlert)
    }

    fn stop_alert(&self) -> Result<(), SinkError> {
        self.print(&Command::StopAlert)
    }
}

/// Runs the argv templates from `[commands]` in the config.
///
/// Dial and stop commands are fire-and-forget; a background thread reaps
/// them and logs a non-zero exit. The alert process is kept so it can be
/// killed when the alert is stopped.
pub struct ProcessSink {
    commands: CommandsConfig,
    alert: Mutex<Option<Child>>,
}

impl ProcessSink {
    pub fn new(commands: CommandsConfig) -> Self {
        Self {
            commands,
            alert: Mutex::new(None),
        }
    }

    fn spawn(
        &self,
        what: &str,
        template: &[String],
        number: Option<&TargetNumber>,
    ) -> Result<Child, SinkError> {
        let (program, args) = template
            .split_first()
            .ok_or_else(|| SinkError::Unavailable(format!("no {what} command configured")))?;
        let args: Vec<String> = args
            .iter()
            .map(|arg| match number {
                Some(number) => arg.replace("{number}", number.as_str()),
                None => arg.clone(),
            })
            .collect();

        tracing::debug!(program = %program, ?args, "spawning {what} command");
        let child = Process::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()?;
        Ok(child)
    }

    fn detach(what: &'static str, mut child: Child) {
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!(%status, "{what} command exited unsuccessfully");
            }
            Err(err) => tracing::warn!(error = %err, "{what} command could not be awaited"),
            Ok(_) => {}
        });
    }

    fn kill_alert(&self) -> bool {
        let Ok(mut slot) = self.alert.lock() else {
            return false;
        };
        match slot.take() {
            Some(mut child) => {
                if let Err(err) = child.kill() {
                    tracing::debug!(error = %err, "alert process already gone");
                }
                let _ = child.wait();
                true
            }
            None => false,
        }
    }
}

impl CommandSink for ProcessSink {
    fn dial(&self, number: &TargetNumber) -> Result<(), SinkError> {
        let child = self.spawn("dial", &self.commands.dial, Some(number))?;
        Self::detach("dial", child);
        Ok(())
    }

    fn play_alert(&self) -> Result<(), SinkError> {
        self.kill_alert();
        let child = self.spawn("play_alert", &self.commands.play_alert, None)?;
        if let Ok(mut slot) = self.alert.lock() {
            *slot = Some(child);
        }
        Ok(())
    }

    fn stop_alert(&self) -> Result<(), SinkError> {
        let killed = self.kill_alert();
        if self.commands.stop_alert.is_empty() {
            if !killed {
                tracing::debug!("no alert process to stop");
            }
            return Ok(());
        }
        let child = self.spawn("stop_alert", &self.commands.stop_alert, None)?;
        Self::detach("stop_alert", child);
        Ok(())
    }
}

impl Drop for ProcessSink {
    fn drop(&mut self) {
        self.kill_alert();
    }
}
