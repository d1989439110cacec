//! Script Kit Bridge - the script side of the Script Kit prompt protocol
//!
//! A script asks the app for input by pushing prompt descriptions over a
//! JSONL process channel and reacting to the UI events that come back.
//!
//! - `protocol` - envelopes, channel tags, payload types
//! - `transport` / `bus` - the process channel and its fan-out
//! - `choices` - static and generated choice lists
//! - `session` - one prompt's lifecycle, from SET_PROMPT_DATA to a value
//! - `supervisor` - newer prompts superseding older ones
//! - `kit` - the script-facing API built on all of the above

pub mod bus;
pub mod choices;
pub mod collab;
pub mod config;
pub mod error;
pub mod error_prompt;
pub mod hooks;
pub mod kit;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use error::{KitError, Result};
pub use kit::{Kit, KitBuilder, RecordingTerminator, Terminator};
pub use session::{Action, PromptConfig, PromptValue, Shortcut, Tab};
