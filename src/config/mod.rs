//! Configuration module - bridge timing and environment settings
//!
//! This module provides functionality for:
//! - Loading configuration from ~/.kit/bridge.json (or $KIT_BRIDGE_CONFIG)
//! - Default values for all settings
//!
//! # Module Structure
//!
//! - `defaults` - All default constant values
//! - `types` - The `BridgeConfig` struct
//! - `loader` - File system loading and parsing

mod defaults;
mod loader;
mod types;

pub use defaults::{
    DEFAULT_BUS_CAPACITY, DEFAULT_DEBOUNCE_CHOICE_FOCUS_MS, DEFAULT_DEBOUNCE_INPUT_MS,
    DEFAULT_PREVIEW_WIDTH_PERCENT, DEFAULT_SEND_WAIT_TIMEOUT_MS,
};

pub use types::BridgeConfig;

pub use loader::{config_path, load_config, load_config_from};

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
