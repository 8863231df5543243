//! Sequence discovery and state tracking.

mod finder;
mod tracker;

pub use finder::{find_sequences, FinderOptions, IncompleteSequencePolicy};
pub use tracker::{SequenceStateTracker, TrackerSnapshot};
