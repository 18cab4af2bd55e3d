use std::path::Path;

use clap::Subcommand;
use redialer_core::Config;

use super::{load_config, save_config};

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "target_number", "commands.dial")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value; lists take a JSON array
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = load_config(config_path)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = load_config(config_path)?;
            config.set(&key, &value)?;
            save_config(&config, config_path)?;
            if let Err(err) = config.validate() {
                tracing::warn!("saved, but monitoring will not start until fixed: {err}");
            }
            println!("ok");
        }
        ConfigAction::List => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Reset => {
            save_config(&Config::default(), config_path)?;
            println!("config reset to defaults");
        }
        ConfigAction::Path => {
            let path = match config_path {
                Some(path) => path.to_path_buf(),
                None => Config::path()?,
            };
            println!("{}", path.display());
        }
    }
    Ok(())
}
