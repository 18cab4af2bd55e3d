use std::path::Path;
use std::sync::Arc;

use clap::Args;
use redialer_core::{CommandSink, Monitor, MonitorHandle};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{resolve_settings, AutomatonArgs, Input};
use crate::sink::{JsonSink, ProcessSink};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub automaton: AutomatonArgs,
    /// Print commands as JSON instead of running the configured programs
    #[arg(long)]
    pub dry_run: bool,
}

/// Monitor call states read from stdin until EOF, `stop`, or Ctrl-C.
pub fn run(args: RunArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, settings) = resolve_settings(config_path, &args.automaton)?;

    let sink: Arc<dyn CommandSink> = if args.dry_run || config.commands.dial.is_empty() {
        if !args.dry_run {
            tracing::info!("no dial command configured, printing commands instead");
        }
        Arc::new(JsonSink)
    } else {
        Arc::new(ProcessSink::new(config.commands.clone()))
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let mut monitor = Monitor::new();
        monitor.configure(settings)?;
        let handle = monitor.start(sink)?;

        let result = read_inputs(&handle).await;
        monitor.stop().await?;
        result
    })
}

async fn read_inputs(handle: &MonitorHandle) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };

        match Input::parse(&line) {
            Ok(None) => {}
            Ok(Some(Input::State(state))) => handle.on_call_state_changed(state)?,
            Ok(Some(Input::Code(code))) => handle.on_state_code(code)?,
            Ok(Some(Input::StopAlert)) => handle.stop_alert()?,
            Ok(Some(Input::Status)) => {
                let status = handle.status().await?;
                println!("{}", serde_json::to_string(&status)?);
            }
            Ok(Some(Input::Stop)) => return Ok(()),
            Err(err) => tracing::warn!(input = %line.trim(), "{err}"),
        }
    }
}
