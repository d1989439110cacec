//! JSONL channel protocol between a script and the Script Kit app
//!
//! Every line is an envelope `{ "channel": ..., "state"?: ..., "value"?: ... }`.
//! The app renders prompts and reports UI events; the script pushes prompt
//! data and choices, and answers on the same process channel.
//!
//! # Channel families
//!
//! ## UI events (app → script)
//! - `INPUT`, `CHOICE_FOCUSED`, `TAB_CHANGED`, `SHORTCUT`, `ACTION`
//! - `VALUE_SUBMITTED`, `ESCAPE`, `BLUR`, `ABANDON`
//! - drag/drop, paste, keyword, menu toggle, audio data
//!
//! ## Commands (script → app, fire-and-forget)
//! - `SET_PROMPT_DATA`, `SET_CHOICES`, `SET_PANEL`, `SET_PREVIEW`, `SET_HINT`
//! - `PREVENT_SUBMIT`, `VALUE_INVALID`, `BEFORE_EXIT`, `SET_ERROR`
//!
//! ## Requests (script asks, app replies on the same channel)
//! - `GET_APP_STATE`, `GET_INPUT`, `GET_BOUNDS`
//!
//! # Module Structure
//!
//! - `channel`: the `Channel` tag enum
//! - `message`: `AppMessage` envelope and `AppState` snapshot
//! - `types`: payload types (ChoiceData, PromptData, ShortcutData, ...)
//! - `semantic_id`: choice id generation
//! - `io`: graceful JSONL parsing and serialization

mod channel;
mod io;
mod message;
mod semantic_id;
mod types;

pub use channel::*;
pub use io::*;
pub use message::*;
pub use semantic_id::*;
pub use types::*;
