pub mod calibration;
pub mod exposure;
pub mod recipe;
pub mod scheduler;
pub mod sequence;
pub mod source;
pub mod state;
pub mod trigger;

pub use calibration::{
    AttemptOutcome, CalibrationConfig, CalibrationProcessor, CalibrationState, CalibrationStep,
    CalibrationType, FailedSequencePolicy,
};
pub use exposure::{Exposure, ExposureClass, HeaderReader, Sequence, SequenceCounters};
pub use recipe::{
    Fiber, RecipeCommand, RecipeFailure, RecipeFailureKind, RecipeInvoker, RecipeOutcome,
    RecipeRunner, SubprocessConfig, SubprocessInvoker,
};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerState, StopSignal, WorkHandler};
pub use sequence::{
    find_sequences, FinderOptions, IncompleteSequencePolicy, SequenceStateTracker,
};
pub use source::{ExposureSource, NewExposures, SourceError};
pub use state::{FileLock, StateError, StateStore};
pub use trigger::TriggerProcessor;
