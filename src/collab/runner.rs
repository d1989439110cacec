//! Launching scripts through the kit runtime

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::{KitError, Result};

/// Runs another script and waits for it to exit
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, script_path: &Path, args: &[String]) -> Result<()>;
}

/// Find an executable in the usual install locations, then on PATH
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let common_paths = [
        dirs::home_dir().map(|h| h.join(".kit/bin")),
        dirs::home_dir().map(|h| h.join(".bun/bin")),
        dirs::home_dir().map(|h| h.join(".volta/bin")),
        dirs::home_dir().map(|h| h.join(".local/bin")),
        Some(PathBuf::from("/opt/homebrew/bin")),
        Some(PathBuf::from("/usr/local/bin")),
    ];

    for dir in common_paths.iter().flatten() {
        let candidate = dir.join(name);
        if candidate.exists() {
            debug!(path = %candidate.display(), "Found executable");
            return Some(candidate);
        }
    }
    which::which(name).ok()
}

/// Spawns `<program> run <script> <args...>`, `kit` by default
#[derive(Clone, Debug)]
pub struct CommandRunner {
    program: PathBuf,
}

impl Default for CommandRunner {
    fn default() -> Self {
        CommandRunner {
            program: find_executable("kit").unwrap_or_else(|| PathBuf::from("kit")),
        }
    }
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandRunner {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, script_path: &Path, args: &[String]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("run")
            .arg(script_path)
            .args(args)
            .stdin(Stdio::null())
            // stdout is our protocol channel
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        command
    }
}

#[async_trait]
impl ProcessRunner for CommandRunner {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn run(&self, script_path: &Path, args: &[String]) -> Result<()> {
        let mut child = self.command(script_path, args).spawn().map_err(|e| {
            KitError::ProcessSpawn(format!("{}: {}", self.program.display(), e))
        })?;
        info!(pid = child.id(), script = %script_path.display(), "Spawned script");

        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(|e| KitError::ProcessSpawn(e.to_string()))?
            .map_err(|source| KitError::Io {
                path: script_path.display().to_string(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(KitError::ProcessSpawn(format!(
                "{} exited with {}",
                script_path.display(),
                status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_shape() {
        let runner = CommandRunner::new("/usr/local/bin/kit");
        let args = ["--input".to_string(), "hi".to_string()];
        let command = runner.command(Path::new("/k/main/index.js"), &args);
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["run", "/k/main/index.js", "--input", "hi"]);
        assert_eq!(command.get_program(), "/usr/local/bin/kit");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = CommandRunner::new("/nonexistent/kit-binary");
        let err = runner.run(Path::new("x.ts"), &[]).await.unwrap_err();
        assert!(matches!(err, KitError::ProcessSpawn(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        // `false run x` ignores its args and exits 1
        let runner = CommandRunner::new("false");
        let err = runner.run(Path::new("x.ts"), &[]).await.unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }
}
