//! TOML-based application configuration.
//!
//! Stores:
//! - The number to redial
//! - Debounce window and long-call alert delay
//! - Redial mode and start-up behavior
//! - External commands used to dial and play/stop the alert
//!
//! Configuration is stored at `~/.config/redialer/config.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::automaton::Settings;
use crate::error::ConfigError;
use crate::redial::{RedialMode, TargetNumber};

/// Argv templates for the process-backed command sink.
///
/// `{number}` in any argument is replaced by the target number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub dial: Vec<String>,
    #[serde(default)]
    pub play_alert: Vec<String>,
    /// Optional: without it the alert process is killed instead.
    #[serde(default)]
    pub stop_alert: Vec<String>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/redialer/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target_number: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_alert_delay_ms")]
    pub alert_delay_ms: u64,
    /// Redial after unanswered calls too.
    #[serde(default)]
    pub redial_on_any_idle: bool,
    #[serde(default)]
    pub dial_on_start: bool,
    #[serde(default)]
    pub commands: CommandsConfig,
}

fn default_debounce_ms() -> u64 {
    3_000
}
fn default_alert_delay_ms() -> u64 {
    240_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_number: String::new(),
            debounce_ms: default_debounce_ms(),
            alert_delay_ms: default_alert_delay_ms(),
            redial_on_any_idle: false,
            dial_on_start: false,
            commands: CommandsConfig::default(),
        }
    }
}

/// Returns `~/.config/redialer[-dev]/` based on REDIALER_ENV.
///
/// Set REDIALER_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("REDIALER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("redialer-dev")
    } else {
        base_dir.join("redialer")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: "unknown config key".into(),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as bool")))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?,
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by key in memory. The value must parse as the existing
    /// field's type. Call `save` to persist.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    pub fn redial_mode(&self) -> RedialMode {
        if self.redial_on_any_idle {
            RedialMode::AnyIdle
        } else {
            RedialMode::AfterConnected
        }
    }

    /// Check every value the automaton depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings().map(|_| ())
    }

    /// Build runtime settings from this config.
    ///
    /// The debounce window and the alert delay are independent: the
    /// countdown starts once the window confirms a connection, so any
    /// combination is valid. Only a zero alert delay is rejected, since it
    /// would sound the alert on every answered call.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let target = TargetNumber::parse(&self.target_number)?;
        if self.alert_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "alert_delay_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(Settings::new(target)
            .with_debounce(Duration::from_millis(self.debounce_ms))
            .with_alert_delay(Duration::from_millis(self.alert_delay_ms))
            .with_mode(self.redial_mode())
            .with_dial_on_start(self.dial_on_start))
    }
}
