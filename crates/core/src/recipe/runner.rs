//! Recipe runner: logging, failure classification and notification around an
//! invoker.

use std::sync::Arc;

use tracing::{error, info};

use super::traits::{FailureHandler, RecipeInvoker};
use super::types::{RecipeCommand, RecipeFailure, RecipeFailureKind};

/// Runs recipes through an invoker, classifying and reporting failures.
///
/// All expected failure modes come back as a `false` return, never as an
/// error: a failed recipe must not halt the worker or other in-flight work.
pub struct RecipeRunner {
    invoker: Arc<dyn RecipeInvoker>,
    failure_handler: Arc<dyn FailureHandler>,
    /// Program names whose failures are not propagated to the notification
    /// sink (still logged).
    ignored_programs: Vec<String>,
    /// When set, commands are logged but not executed.
    trace: bool,
}

impl RecipeRunner {
    pub fn new(invoker: Arc<dyn RecipeInvoker>, failure_handler: Arc<dyn FailureHandler>) -> Self {
        Self {
            invoker,
            failure_handler,
            ignored_programs: Vec::new(),
            trace: false,
        }
    }

    /// Sets the programs whose failures bypass the notification sink.
    pub fn with_ignored_programs(mut self, programs: Vec<String>) -> Self {
        self.ignored_programs = programs;
        self
    }

    /// Enables trace mode: log the command and report success without
    /// running anything.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Runs one recipe. Returns whether it succeeded and passed QC.
    pub async fn run(&self, command: &RecipeCommand) -> bool {
        let command_string = command.command_string();
        info!("{}", command_string);
        if self.trace {
            return true;
        }

        match self.invoker.invoke(command).await {
            Ok(outcome) => {
                if outcome.success && outcome.qc_passed {
                    true
                } else {
                    let kind = if !outcome.success {
                        RecipeFailureKind::SystemExit
                    } else {
                        RecipeFailureKind::QcFailure
                    };
                    self.report(command, kind, command_string, outcome.diagnostics);
                    false
                }
            }
            Err(e) => {
                error!("Failed to invoke {}: {}", command_string, e);
                self.report(command, RecipeFailureKind::Error, command_string, None);
                false
            }
        }
    }

    fn report(
        &self,
        command: &RecipeCommand,
        kind: RecipeFailureKind,
        command_string: String,
        diagnostics: Option<String>,
    ) {
        let failure = RecipeFailure {
            kind,
            command_string,
        };
        match diagnostics {
            Some(diagnostics) => error!("{} ({})", failure, diagnostics.trim_end()),
            None => error!("{}", failure),
        }
        let ignored = self
            .ignored_programs
            .iter()
            .any(|program| program == command.program());
        if !ignored {
            self.failure_handler.handle_failure(&failure);
        }
    }
}
