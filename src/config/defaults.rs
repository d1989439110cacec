//! Default configuration values
//!
//! All constants used throughout the config module are defined here.

/// Trailing-edge debounce for INPUT re-evaluation of generator choices
pub const DEFAULT_DEBOUNCE_INPUT_MS: u64 = 200;

/// Choice focus previews run immediately unless configured otherwise
pub const DEFAULT_DEBOUNCE_CHOICE_FOCUS_MS: u64 = 0;

/// How long `send_wait` waits for a reply (0 = forever)
pub const DEFAULT_SEND_WAIT_TIMEOUT_MS: u64 = 1000;

/// Slots in the inbound multicast buffer before slow subscribers lag
pub const DEFAULT_BUS_CAPACITY: usize = 256;

pub const DEFAULT_PREVIEW_WIDTH_PERCENT: u8 = 60;

pub const DEFAULT_KIT_PATH: &str = "~/.kit";

/// Environment variable that points at an alternate config file
pub const CONFIG_PATH_ENV: &str = "KIT_BRIDGE_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "~/.kit/bridge.json";
