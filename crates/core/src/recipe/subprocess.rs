//! Subprocess-based recipe invoker.
//!
//! Every recipe runs in its own child process. The reduction routines are
//! not re-entrant and may abort their host on internal failure, so a crash
//! is contained to the child and surfaces as an ordinary failed outcome.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::traits::{InvokeError, RecipeInvoker};
use super::types::{RecipeCommand, RecipeOutcome};

/// Exit code the recipe wrapper scripts use for a quality-control rejection.
const QC_FAILURE_EXIT_CODE: i32 = 2;

/// How many bytes of stderr tail to keep as diagnostics.
const DIAGNOSTICS_TAIL_BYTES: usize = 2048;

/// Configuration for the subprocess invoker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessConfig {
    /// Directory containing the recipe programs.
    pub recipes_dir: PathBuf,

    /// Optional interpreter to run the programs with (e.g. a pinned python).
    #[serde(default)]
    pub interpreter: Option<PathBuf>,
}

/// Runs recipes as child processes via `tokio::process`.
pub struct SubprocessInvoker {
    config: SubprocessConfig,
}

impl SubprocessInvoker {
    pub fn new(config: SubprocessConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, recipe: &RecipeCommand) -> Command {
        let program_path = self.config.recipes_dir.join(recipe.program());
        let mut command = match &self.config.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(interpreter);
                command.arg(&program_path);
                command
            }
            None => Command::new(&program_path),
        };
        command.arg(recipe.night());
        command.args(recipe.filenames());
        command.args(recipe.named_args());
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::piped());
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl RecipeInvoker for SubprocessInvoker {
    async fn invoke(&self, recipe: &RecipeCommand) -> Result<RecipeOutcome, InvokeError> {
        let output = self
            .build_command(recipe)
            .output()
            .await
            .map_err(|source| InvokeError::Spawn {
                program: recipe.program().to_string(),
                source,
            })?;

        let diagnostics = if output.stderr.is_empty() {
            None
        } else {
            let tail_start = output.stderr.len().saturating_sub(DIAGNOSTICS_TAIL_BYTES);
            Some(String::from_utf8_lossy(&output.stderr[tail_start..]).into_owned())
        };

        debug!("{} exited with {:?}", recipe.program(), output.status.code());

        // A killed process has no exit code; treat it like any abnormal exit.
        let outcome = match output.status.code() {
            Some(0) => RecipeOutcome {
                success: true,
                qc_passed: true,
                diagnostics,
            },
            Some(QC_FAILURE_EXIT_CODE) => RecipeOutcome {
                success: true,
                qc_passed: false,
                diagnostics,
            },
            _ => RecipeOutcome {
                success: false,
                qc_passed: false,
                diagnostics,
            },
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exposure::Exposure;

    fn invoker(recipes_dir: &std::path::Path) -> SubprocessInvoker {
        SubprocessInvoker::new(SubprocessConfig {
            recipes_dir: recipes_dir.to_path_buf(),
            interpreter: Some(PathBuf::from("/bin/sh")),
        })
    }

    fn preprocess_command() -> RecipeCommand {
        RecipeCommand::Preprocess {
            exposure: Exposure::new("2024-05-01", "a.fits"),
        }
    }

    fn write_script(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[tokio::test]
    async fn test_exit_zero_is_success() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "cal_preprocess", "exit 0\n");
        let outcome = invoker(dir.path())
            .invoke(&preprocess_command())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.qc_passed);
    }

    #[tokio::test]
    async fn test_qc_exit_code_is_qc_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "cal_preprocess", "echo 'QC rejected' >&2\nexit 2\n");
        let outcome = invoker(dir.path())
            .invoke(&preprocess_command())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(!outcome.qc_passed);
        assert!(outcome.diagnostics.unwrap().contains("QC rejected"));
    }

    #[tokio::test]
    async fn test_abnormal_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "cal_preprocess", "exit 1\n");
        let outcome = invoker(dir.path())
            .invoke(&preprocess_command())
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = SubprocessInvoker::new(SubprocessConfig {
            recipes_dir: dir.path().to_path_buf(),
            interpreter: None,
        });
        let result = invoker.invoke(&preprocess_command()).await;
        assert!(matches!(result, Err(InvokeError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_arguments_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        write_script(
            dir.path(),
            "cal_preprocess",
            "[ \"$1\" = 2024-05-01 ] && [ \"$2\" = a.fits ] && exit 0\nexit 1\n",
        );
        let outcome = invoker(dir.path())
            .invoke(&preprocess_command())
            .await
            .unwrap();
        assert!(outcome.success);
    }
}
