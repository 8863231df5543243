//! Persisted scheduler state.

use serde::{Deserialize, Serialize};

use crate::exposure::{Exposure, Sequence};
use crate::sequence::TrackerSnapshot;

/// Snapshot of everything the scheduler needs to resume after a restart.
///
/// Pure data: queues, workers and channels are reconstructed fresh on every
/// start, with the in-flight items re-injected onto the in queues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    /// Sequence tracker bookkeeping.
    pub tracker: TrackerSnapshot,
    /// Exposures handed out but not yet reported done.
    pub in_flight_exposures: Vec<Exposure>,
    /// Sequences handed out but not yet reported done.
    pub in_flight_sequences: Vec<Sequence>,
    /// Opaque resume cursor for the exposure source.
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_json() {
        let state = SchedulerState {
            tracker: TrackerSnapshot::default(),
            in_flight_exposures: vec![Exposure::new("n1", "a.fits")],
            in_flight_sequences: vec![
                Sequence::new(vec![Exposure::new("n1", "b.fits")]).unwrap()
            ],
            cursor: Some("n1/a.fits".to_string()),
        };
        let json = serde_json::to_string(&state).unwrap();
        let loaded: SchedulerState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, state);
    }
}
