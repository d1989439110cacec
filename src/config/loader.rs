//! Configuration loading from file system

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::defaults::{CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use super::types::BridgeConfig;

/// Where the config lives: `$KIT_BRIDGE_CONFIG`, else `~/.kit/bridge.json`
pub fn config_path() -> PathBuf {
    let raw = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

/// Load configuration from the default location.
///
/// Returns `BridgeConfig::default()` if the file is missing or invalid.
pub fn load_config() -> BridgeConfig {
    load_config_from(&config_path())
}

#[instrument(name = "load_config", skip_all, fields(path = %path.display()))]
pub fn load_config_from(path: &Path) -> BridgeConfig {
    if !path.exists() {
        info!("Config file not found, using defaults");
        return BridgeConfig::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, "Failed to read config file, using defaults");
            return BridgeConfig::default();
        }
    };

    match serde_json::from_str::<BridgeConfig>(&contents) {
        Ok(config) => {
            info!("Successfully loaded config");
            config
        }
        Err(e) => {
            let hint = if e.is_data() {
                "\n\nHint: timing fields are milliseconds as plain numbers, e.g. { \"debounceInputMs\": 150 }"
            } else {
                ""
            };
            warn!(
                error = %e,
                hint = %hint,
                "Failed to parse config JSON, using defaults"
            );
            BridgeConfig::default()
        }
    }
}
