use cadence_core::config::EngineConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::timezone::detect_system_timezone;

pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_path: String,
    /// `tracing` filter directive; `RUST_LOG` takes precedence
    pub log_filter: String,
    /// Timezone for new templates when none is given
    pub default_timezone: String,
    pub engine: EngineConfig,
    pub notifier: NotifierConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct NotifierConfig {
    /// Append reminders as JSON lines to this file; log them when unset
    pub outbox_path: Option<PathBuf>,
    /// Recipient for tasks without an owner
    pub default_recipient: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "cadence.db".to_string(),
            log_filter: "info".to_string(),
            default_timezone: detect_system_timezone(),
            engine: EngineConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            outbox_path: None,
            default_recipient: cadence_core::jobs::reminders::DEFAULT_RECIPIENT.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `CADENCE_*` variables
    /// (`CADENCE_ENGINE__MAX_BATCH_SIZE=50` sets `engine.max_batch_size`).
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("CADENCE_").split("__"))
            .extract()
    }
}
