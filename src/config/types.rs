//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

/// Bridge settings, read from `~/.kit/bridge.json`
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Debounce for INPUT re-evaluation (default: 200)
    #[serde(default = "default_debounce_input_ms")]
    pub debounce_input_ms: u64,
    /// Debounce for CHOICE_FOCUSED previews (default: 0)
    #[serde(default = "default_debounce_choice_focus_ms")]
    pub debounce_choice_focus_ms: u64,
    /// `send_wait` reply timeout, 0 waits forever (default: 1000)
    #[serde(default = "default_send_wait_timeout_ms")]
    pub send_wait_timeout_ms: u64,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    #[serde(default = "default_preview_width_percent")]
    pub preview_width_percent: u8,
    /// Kit environment root; `~` is expanded (default: ~/.kit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kit_path: Option<String>,
    /// Log directory override (default: <kit_path>/logs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

fn default_debounce_input_ms() -> u64 {
    DEFAULT_DEBOUNCE_INPUT_MS
}
fn default_debounce_choice_focus_ms() -> u64 {
    DEFAULT_DEBOUNCE_CHOICE_FOCUS_MS
}
fn default_send_wait_timeout_ms() -> u64 {
    DEFAULT_SEND_WAIT_TIMEOUT_MS
}
fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}
fn default_preview_width_percent() -> u8 {
    DEFAULT_PREVIEW_WIDTH_PERCENT
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            debounce_input_ms: DEFAULT_DEBOUNCE_INPUT_MS,
            debounce_choice_focus_ms: DEFAULT_DEBOUNCE_CHOICE_FOCUS_MS,
            send_wait_timeout_ms: DEFAULT_SEND_WAIT_TIMEOUT_MS,
            bus_capacity: DEFAULT_BUS_CAPACITY,
            preview_width_percent: DEFAULT_PREVIEW_WIDTH_PERCENT,
            kit_path: None,
            log_dir: None,
        }
    }
}

impl BridgeConfig {
    pub fn debounce_input(&self) -> Duration {
        Duration::from_millis(self.debounce_input_ms)
    }

    pub fn debounce_choice_focus(&self) -> Duration {
        Duration::from_millis(self.debounce_choice_focus_ms)
    }

    pub fn send_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.send_wait_timeout_ms)
    }

    /// Percent is clamped to 0..=100
    pub fn preview_width_percent(&self) -> u8 {
        self.preview_width_percent.min(100)
    }

    pub fn kit_path(&self) -> PathBuf {
        let raw = self.kit_path.as_deref().unwrap_or(DEFAULT_KIT_PATH);
        PathBuf::from(shellexpand::tilde(raw).as_ref())
    }

    pub fn log_dir(&self) -> PathBuf {
        match &self.log_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => self.kit_path().join("logs"),
        }
    }
}
