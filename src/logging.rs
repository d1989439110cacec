//! Structured JSONL logging to a file plus human-readable stderr output.
//!
//! - **JSONL to file** (~/.kit/logs/script-kit-bridge.jsonl) - structured, one event per line
//! - **Compact to stderr** - for developers watching a script run
//!
//! stdout is the protocol channel, so nothing here may ever write to it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use script_kit_bridge::logging;
//!
//! // MUST keep the guard alive for the duration of the program
//! let _guard = logging::init(None);
//! tracing::info!(event_type = "script_start", "Script started");
//! ```

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::protocol::Channel;

const LOG_FILE_NAME: &str = "script-kit-bridge.jsonl";

// In-memory ring of recent lines, surfaced in error presentations
static LOG_BUFFER: OnceLock<Mutex<VecDeque<String>>> = OnceLock::new();
const MAX_LOG_LINES: usize = 50;

/// Guard that must be kept alive for the duration of the program.
/// Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize dual-output logging.
///
/// `log_dir` overrides the default `~/.kit/logs`. When the file can't be
/// opened, logging continues on stderr only.
pub fn init(log_dir: Option<&Path>) -> LoggingGuard {
    let _ = LOG_BUFFER.set(Mutex::new(VecDeque::with_capacity(MAX_LOG_LINES)));

    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("[LOGGING] Failed to create log directory: {}", e);
    }
    let log_path = log_dir.join(LOG_FILE_NAME);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Generic over the subscriber so each branch below gets its own instance
    macro_rules! stderr_layer {
        () => {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .compact()
        };
    }

    let file = OpenOptions::new().create(true).append(true).open(&log_path);

    let file_guard = match file {
        Ok(file) => {
            // Non-blocking so a slow disk never stalls event dispatch
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file);
            let json_layer = fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_span_events(FmtSpan::NONE);

            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .with(stderr_layer!())
                .try_init();
            Some(guard)
        }
        Err(e) => {
            eprintln!("[LOGGING] Failed to open log file: {}", e);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer!())
                .try_init();
            None
        }
    };

    tracing::info!(
        event_type = "bridge_lifecycle",
        action = "started",
        log_path = %log_path.display(),
        "Bridge logging initialized"
    );

    LoggingGuard {
        _file_guard: file_guard,
    }
}

/// Default log directory (~/.kit/logs/)
pub fn default_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".kit").join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("script-kit-logs"))
}

fn add_to_buffer(category: &str, message: &str) {
    if let Some(buffer) = LOG_BUFFER.get() {
        if let Ok(mut buf) = buffer.lock() {
            if buf.len() >= MAX_LOG_LINES {
                buf.pop_front();
            }
            buf.push_back(format!("[{}] {}", category, message));
        }
    }
}

/// Get the last N buffered log lines, newest first
pub fn get_last_logs(n: usize) -> Vec<String> {
    if let Some(buffer) = LOG_BUFFER.get() {
        if let Ok(buf) = buffer.lock() {
            return buf.iter().rev().take(n).cloned().collect();
        }
    }
    Vec::new()
}

// =============================================================================
// STRUCTURED LOGGING HELPERS
// =============================================================================

/// Log one envelope crossing the process channel
pub fn log_channel_event(direction: &str, channel: &Channel, prompt_id: Option<&str>) {
    tracing::trace!(
        event_type = "channel",
        direction = direction,
        channel = %channel,
        prompt_id = prompt_id,
        "{} {}", direction, channel
    );
}

/// Log a prompt lifecycle transition
pub fn log_prompt_event(prompt_id: u64, action: &str, details: Option<&str>) {
    let msg = match details {
        Some(d) => format!("prompt #{} {} - {}", prompt_id, action, d),
        None => format!("prompt #{} {}", prompt_id, action),
    };
    add_to_buffer("PROMPT", &msg);

    tracing::debug!(
        event_type = "prompt_event",
        prompt_id = prompt_id,
        action = action,
        details = details,
        "{}", msg
    );
}

/// Log a duration, warning when it crosses `threshold_ms`
pub fn log_perf(operation: &str, duration_ms: u64, threshold_ms: u64) {
    let is_slow = duration_ms > threshold_ms;
    let marker = if is_slow { "SLOW" } else { "OK" };
    add_to_buffer("PERF", &format!("{} {}ms [{}]", operation, duration_ms, marker));

    if is_slow {
        tracing::warn!(
            event_type = "performance",
            operation = operation,
            duration_ms = duration_ms,
            threshold_ms = threshold_ms,
            is_slow = true,
            "Slow operation: {} took {}ms (threshold: {}ms)", operation, duration_ms, threshold_ms
        );
    } else {
        tracing::debug!(
            event_type = "performance",
            operation = operation,
            duration_ms = duration_ms,
            threshold_ms = threshold_ms,
            is_slow = false,
            "Operation {} completed in {}ms", operation, duration_ms
        );
    }
}

/// Log an error with category and optional context
pub fn log_error(category: &str, error: &str, context: Option<&str>) {
    let msg = match context {
        Some(ctx) => format!("{}: {} (context: {})", category, error, ctx),
        None => format!("{}: {}", category, error),
    };
    add_to_buffer("ERROR", &msg);

    tracing::error!(
        event_type = "error",
        category = category,
        error_message = error,
        context = context,
        "{}", msg
    );
}
