//! External collaborators a prompt may reach for
//!
//! - `scripts`: script metadata (`// Name:`, `// Shortcut:`, ...) resolution
//! - `runner`: launching another script through the kit runtime
//! - `storage`: key/value stores and the clipboard history facade

mod runner;
mod scripts;
mod storage;

pub use runner::{find_executable, CommandRunner, ProcessRunner};
pub use scripts::{parse_metadata_comments, MetadataScriptResolver, ScriptInfo, ScriptResolver};
pub use storage::{ClipboardHistory, ClipboardItem, JsonFileStore, KeyValueStore, MemoryStore};
