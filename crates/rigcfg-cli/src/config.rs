//! Configuration loading

use anyhow::Result;
use rigcfg_hal::DEVICE_LIST_FILE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rig: RigConfig,
    #[serde(default)]
    pub check: CheckConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub bringup: BringupConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RigConfig {
    /// Simulated rig description; the built-in demo rig when unset
    #[serde(default)]
    pub path: Option<String>,
}

/// How configuration entries naming missing devices are pruned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrunePolicy {
    /// Drop single settings, then emptied presets and groups
    #[default]
    Prune,
    /// Drop any group holding a setting for a missing device
    Strict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub policy: PrunePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Device enumeration file written by `devlist`
    #[serde(default = "default_device_list")]
    pub device_list: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_list: default_device_list(),
        }
    }
}

fn default_device_list() -> String {
    DEVICE_LIST_FILE.to_string()
}

/// What to do with a device that fails to initialize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailureDecision {
    Remove,
    #[default]
    Keep,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BringupConfig {
    #[serde(default)]
    pub on_failure: FailureDecision,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        rig: RigConfig {
            path: Some("rig.toml".to_string()),
        },
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
