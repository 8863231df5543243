//! Trait definitions for recipe invocation and failure reporting.

use async_trait::async_trait;

use super::types::{RecipeCommand, RecipeFailure, RecipeOutcome};

/// Errors from the invocation machinery itself (not from the recipe).
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// The recipe program could not be spawned or waited on.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Executes one external reduction recipe.
///
/// Implementations run the recipe out of process; a crash of the recipe must
/// never take the caller down with it.
#[async_trait]
pub trait RecipeInvoker: Send + Sync {
    async fn invoke(&self, command: &RecipeCommand) -> Result<RecipeOutcome, InvokeError>;
}

/// Notification sink for recipe failures.
///
/// Called once per failed invocation, after the failure has been logged.
pub trait FailureHandler: Send + Sync {
    fn handle_failure(&self, failure: &RecipeFailure);
}

/// Default failure handler: the failure is already logged by the runner, so
/// this does nothing further.
pub struct LogNotifier;

impl FailureHandler for LogNotifier {
    fn handle_failure(&self, _failure: &RecipeFailure) {}
}
