use thiserror::Error;
use tracing::{error, warn};

/// Error severity for host-side display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,     // informational
    Warning,  // recoverable
    Error,    // the prompt or operation failed
    Critical, // the script cannot continue
}

/// Domain-specific errors for the bridge
#[derive(Error, Debug)]
pub enum KitError {
    /// The process channel failed; fatal to the pending prompt
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Failed to parse protocol message: {0}")]
    ProtocolParse(#[from] serde_json::Error),

    /// A user hook returned an error
    #[error("Prompt handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    /// The hosting script was told to finish (escape/blur/abandon defaults)
    #[error("Script terminated: {reason}")]
    Terminated { reason: String },

    /// A newer prompt took over before this one settled
    #[error("Prompt {prompt_id} was superseded")]
    Superseded { prompt_id: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Process spawn failed: {0}")]
    ProcessSpawn(String),
}

impl KitError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Transport(_) => ErrorSeverity::Critical,
            Self::ProtocolParse(_) => ErrorSeverity::Warning,
            Self::Handler(_) => ErrorSeverity::Error,
            Self::Terminated { .. } => ErrorSeverity::Info,
            Self::Superseded { .. } => ErrorSeverity::Info,
            Self::Config(_) => ErrorSeverity::Warning,
            Self::Io { .. } => ErrorSeverity::Error,
            Self::Storage(_) => ErrorSeverity::Warning,
            Self::ProcessSpawn(_) => ErrorSeverity::Error,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Lost connection to the app: {}", msg),
            Self::ProtocolParse(e) => format!("Invalid message format: {}", e),
            Self::Handler(e) => format!("{:#}", e),
            Self::Terminated { reason } => format!("Script ended ({})", reason),
            Self::Superseded { .. } => "Prompt replaced by a newer prompt".to_string(),
            Self::Config(msg) => format!("Configuration issue: {}", msg),
            Self::Io { path, .. } => format!("Could not access {}", path),
            Self::Storage(msg) => format!("Storage issue: {}", msg),
            Self::ProcessSpawn(msg) => format!("Could not start process: {}", msg),
        }
    }

    /// Termination and supersession end a prompt without anything going wrong
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::Terminated { .. } | Self::Superseded { .. })
    }
}

pub type Result<T> = std::result::Result<T, KitError>;

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and nobody is waiting on the result.
///
/// # Examples
///
/// ```ignore
/// use script_kit_bridge::error::ResultExt;
///
/// bus.send(Channel::SetHint, json!("hi")).log_err();
/// let cached = store.get("history").await.warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
