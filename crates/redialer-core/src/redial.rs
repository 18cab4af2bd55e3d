//! Redial controller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sink::Command;

/// Number to call back. Digits plus the dial-string punctuation a phone
/// keypad accepts (`+ * # , ;`) and cosmetic separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetNumber(String);

impl TargetNumber {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingKey("target_number".into()));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_digit() || "+*#,;-() ".contains(*c)))
        {
            return Err(ConfigError::InvalidValue {
                key: "target_number".into(),
                message: format!("unexpected character '{bad}' in '{trimmed}'"),
            });
        }
        if !trimmed.chars().any(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                key: "target_number".into(),
                message: format!("'{trimmed}' contains no digits"),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TargetNumber {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetNumber> for String {
    fn from(value: TargetNumber) -> Self {
        value.0
    }
}

impl fmt::Display for TargetNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which idle transitions lead to a redial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedialMode {
    /// Only after a call that reached the connected state.
    #[default]
    AfterConnected,
    /// After every idle transition, answered or not.
    AnyIdle,
}

#[derive(Debug, Clone)]
pub struct RedialController {
    target: TargetNumber,
    mode: RedialMode,
    armed: bool,
    dials_issued: u64,
}

impl RedialController {
    pub fn new(target: TargetNumber, mode: RedialMode) -> Self {
        Self {
            target,
            mode,
            armed: true,
            dials_issued: 0,
        }
    }

    pub fn target(&self) -> &TargetNumber {
        &self.target
    }

    pub fn mode(&self) -> RedialMode {
        self.mode
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn dials_issued(&self) -> u64 {
        self.dials_issued
    }

    /// React to a confirmed idle transition. Stays armed afterwards so the
    /// next idle confirmation dials again.
    pub fn on_idle(&mut self, was_connected: bool) -> Option<Command> {
        if !self.armed {
            return None;
        }
        if self.mode == RedialMode::AfterConnected && !was_connected {
            tracing::debug!("call never connected, not redialing");
            return None;
        }
        Some(self.dial())
    }

    /// Issue a dial regardless of call history, e.g. when monitoring starts.
    pub fn dial_now(&mut self) -> Option<Command> {
        self.armed.then(|| self.dial())
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    fn dial(&mut self) -> Command {
        self.dials_issued += 1;
        Command::Dial {
            number: self.target.clone(),
        }
    }
}
