//! Comment metadata in script headers
//!
//! ```typescript
//! // Name: Create Note
//! // Description: Creates a new note
//! // Shortcut: cmd shift n
//! // Schedule: every day at 9am
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use croner::Cron;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{KitError, Result};

/// Only the header is scanned
const METADATA_SCAN_LINES: usize = 20;

/// What the host needs to list and trigger a script
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptInfo {
    pub name: String,
    /// File stem; what `kit run <command>` takes
    pub command: String,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<String>,
    /// Cron expression, converted from natural language when needed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub trait ScriptResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<ScriptInfo>;
}

fn metadata_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*//\s*([A-Za-z][A-Za-z ]*?)\s*:\s*(.*?)\s*$")
            .expect("metadata regex is valid")
    })
}

/// `// Key: value` pairs from the first lines of a script; keys are lowercased
pub fn parse_metadata_comments(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .take(METADATA_SCAN_LINES)
        .filter_map(|line| {
            let caps = metadata_regex().captures(line)?;
            let key = caps.get(1)?.as_str().to_lowercase();
            let value = caps.get(2)?.as_str().to_string();
            (!value.is_empty()).then_some((key, value))
        })
        .collect()
}

/// Reads metadata comments from the script file itself
#[derive(Clone, Debug, Default)]
pub struct MetadataScriptResolver;

impl MetadataScriptResolver {
    pub fn new() -> Self {
        MetadataScriptResolver
    }

    fn schedule(metadata: &HashMap<String, String>, path: &Path) -> Option<String> {
        if let Some(expr) = metadata.get("cron") {
            return match Cron::from_str(expr) {
                Ok(_) => Some(expr.clone()),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        cron = %expr,
                        error = %e,
                        "Invalid cron metadata"
                    );
                    None
                }
            };
        }
        let text = metadata.get("schedule")?;
        match english_to_cron::str_cron_syntax(text) {
            Ok(expr) => Some(expr),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    schedule = %text,
                    error = ?e,
                    "Unrecognized schedule metadata"
                );
                None
            }
        }
    }
}

impl ScriptResolver for MetadataScriptResolver {
    #[instrument(level = "debug", skip(self))]
    fn resolve(&self, path: &Path) -> Result<ScriptInfo> {
        let content = fs::read_to_string(path).map_err(|source| KitError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let metadata = parse_metadata_comments(&content);
        let command = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let info = ScriptInfo {
            name: metadata.get("name").cloned().unwrap_or_else(|| command.clone()),
            schedule: Self::schedule(&metadata, path),
            shortcut: metadata.get("shortcut").cloned(),
            description: metadata.get("description").cloned(),
            file_path: path.to_path_buf(),
            command,
        };
        debug!(name = %info.name, command = %info.command, "Resolved script metadata");
        Ok(info)
    }
}
