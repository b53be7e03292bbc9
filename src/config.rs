//! Runtime configuration of the bridge
//!
//! Read once at startup from `<config dir>/simbridge/config.toml`, or from the
//! path given as first argument. A missing file means defaults.
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//! port = 18082
//!
//! [timing]
//! long_press_ms = 500
//!
//! [[action]]
//! context = "pit"
//! state = "[DataCorePlugin.GameData.IsInPitLane]"
//! title = "format([DataCorePlugin.GameData.SpeedKmh], '0')"
//!
//! [[action.press]]
//! type = "trigger"
//! name = "pit-limiter"
//! condition = "DataCorePlugin.GameRunning"
//! ```

use crate::command::DispatcherSettings;
use crate::telemetry::ClientSettings;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

const CONFIG_DIR: &str = "simbridge";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub timing: TimingConfig,
    #[serde(rename = "action")]
    pub actions: Vec<ActionConfig>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub banner_prefix: String,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let settings = ClientSettings::default();
        Self {
            host: settings.host,
            port: settings.port,
            banner_prefix: settings.banner_prefix,
            reconnect_delay_ms: settings.reconnect_delay_ms,
            connect_timeout_ms: settings.connect_timeout_ms,
        }
    }
}

impl From<&ConnectionConfig> for ClientSettings {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            banner_prefix: config.banner_prefix.clone(),
            reconnect_delay_ms: config.reconnect_delay_ms,
            connect_timeout_ms: config.connect_timeout_ms,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TimingConfig {
    pub dwell_ms: u64,
    pub long_press_ms: u64,
    pub short_press_pause_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let settings = DispatcherSettings::default();
        Self {
            dwell_ms: settings.dwell_ms,
            long_press_ms: settings.long_press_ms,
            short_press_pause_ms: settings.short_press_pause_ms,
        }
    }
}

impl From<&TimingConfig> for DispatcherSettings {
    fn from(config: &TimingConfig) -> Self {
        Self {
            long_press_ms: config.long_press_ms,
            short_press_pause_ms: config.short_press_pause_ms,
            dwell_ms: config.dwell_ms,
        }
    }
}

/// One hardware action instance and what it is bound to
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ActionConfig {
    /// Opaque context id the hardware layer uses for this action
    pub context: String,
    /// Condition deciding the on/off state shown on the device
    pub state: String,
    /// Format expression for the title shown on the device
    pub title: String,
    /// Constants bare identifiers in the expressions resolve to
    pub labels: HashMap<String, String>,
    pub press: Vec<CommandItemConfig>,
    pub dial_left: Vec<CommandItemConfig>,
    pub dial_right: Vec<CommandItemConfig>,
    pub touch_tap: Vec<CommandItemConfig>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct CommandItemConfig {
    #[serde(flatten)]
    pub kind: CommandKindConfig,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub long: bool,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandKindConfig {
    Keypress { hotkey: String },
    Trigger { name: String },
    Role { owner: String, role: String },
}

impl AppConfig {
    /// Loads `path`, or the default location when `None`
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.unwrap_or_else(default_config_path);

        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            warn!(
                "Config file {} does not exist, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config = Self::parse(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        info!(
            "Loaded config from {} with {} actions",
            path.display(),
            config.actions.len()
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
