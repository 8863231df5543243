//! External reduction recipe invocation.
//!
//! Recipes are opaque, named operations run out of process. The runner wraps
//! an invoker with logging, failure classification and notification; the
//! subprocess invoker is the production implementation.

mod runner;
mod subprocess;
mod traits;
mod types;

pub use runner::RecipeRunner;
pub use subprocess::{SubprocessConfig, SubprocessInvoker};
pub use traits::{FailureHandler, InvokeError, LogNotifier, RecipeInvoker};
pub use types::{Fiber, RecipeCommand, RecipeFailure, RecipeFailureKind, RecipeOutcome};
