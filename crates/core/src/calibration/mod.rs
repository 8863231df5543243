//! Calibration sequence bookkeeping and the dependency-ordered step
//! pipeline.

mod processor;
mod types;

pub use processor::{
    AttemptOutcome, CalibrationConfig, CalibrationProcessor, FailedSequencePolicy,
};
pub use types::{CalibrationState, CalibrationStep, CalibrationType};
