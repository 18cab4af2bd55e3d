pub mod config;
pub mod run;
pub mod simulate;

use std::path::Path;

use clap::Args;
use redialer_core::{CallState, Config, ConfigError, Settings};

/// Overrides applied on top of the stored config.
#[derive(Args, Debug, Default)]
pub struct AutomatonArgs {
    /// Number to redial
    #[arg(long)]
    pub number: Option<String>,
    /// Quiet window before a connected state counts, in milliseconds
    #[arg(long)]
    pub debounce_ms: Option<u64>,
    /// Connected duration that triggers the alert, in milliseconds
    #[arg(long)]
    pub alert_delay_ms: Option<u64>,
    /// Redial after unanswered calls too
    #[arg(long)]
    pub any_idle: bool,
    /// Dial once as soon as monitoring starts
    #[arg(long)]
    pub dial_on_start: bool,
}

impl AutomatonArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(number) = &self.number {
            config.target_number = number.clone();
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
        if let Some(ms) = self.alert_delay_ms {
            config.alert_delay_ms = ms;
        }
        config.redial_on_any_idle |= self.any_idle;
        config.dial_on_start |= self.dial_on_start;
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

pub fn save_config(config: &Config, path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    }
}

/// Stored config plus command-line overrides, validated.
pub fn resolve_settings(
    path: Option<&Path>,
    overrides: &AutomatonArgs,
) -> Result<(Config, Settings), ConfigError> {
    let mut config = load_config(path)?;
    overrides.apply(&mut config);
    let settings = config.settings()?;
    Ok((config, settings))
}

/// One line of input for `run` or one step of a `simulate` script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    State(CallState),
    /// Raw platform code, possibly unknown.
    Code(i32),
    StopAlert,
    Status,
    Stop,
}

impl Input {
    /// Parse one word. Returns `None` for blank lines and `#` comments.
    pub fn parse(word: &str) -> Result<Option<Self>, String> {
        let word = word.trim();
        if word.is_empty() || word.starts_with('#') {
            return Ok(None);
        }
        if let Ok(code) = word.parse::<i32>() {
            return Ok(Some(Input::Code(code)));
        }
        let input = match word.to_ascii_lowercase().as_str() {
            "stop-alert" | "stop_alert" => Input::StopAlert,
            "status" => Input::Status,
            "stop" | "quit" => Input::Stop,
            _ => Input::State(word.parse().map_err(|e| format!("{e}"))?),
        };
        Ok(Some(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_words_codes_and_controls() {
        assert_eq!(Input::parse("connected"), Ok(Some(Input::State(CallState::Connected))));
        assert_eq!(Input::parse("OFFHOOK"), Ok(Some(Input::State(CallState::Connected))));
        assert_eq!(Input::parse("0"), Ok(Some(Input::Code(0))));
        assert_eq!(Input::parse("42"), Ok(Some(Input::Code(42))));
        assert_eq!(Input::parse("stop-alert"), Ok(Some(Input::StopAlert)));
        assert_eq!(Input::parse("stop"), Ok(Some(Input::Stop)));
        assert_eq!(Input::parse("  "), Ok(None));
        assert_eq!(Input::parse("# comment"), Ok(None));
        assert!(Input::parse("hangup").is_err());
    }

    #[test]
    fn overrides_replace_stored_values() {
        let mut config = Config::default();
        let args = AutomatonArgs {
            number: Some("112".into()),
            debounce_ms: Some(0),
            alert_delay_ms: None,
            any_idle: true,
            dial_on_start: false,
        };
        args.apply(&mut config);
        assert_eq!(config.target_number, "112");
        assert_eq!(config.debounce_ms, 0);
        assert_eq!(config.alert_delay_ms, 240_000);
        assert!(config.redial_on_any_idle);
    }
}
