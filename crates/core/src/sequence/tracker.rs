//! Bookkeeping from individual exposures to the sequences they belong to.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::exposure::{Exposure, Sequence};

/// Tracks which exposures have been processed and when a complete sequence
/// becomes ready for sequence-level processing.
///
/// An exposure is in the reverse map iff it belongs to a sequence identified
/// as complete and not yet cleared with [`SequenceStateTracker::done_with_sequence`].
#[derive(Debug, Default)]
pub struct SequenceStateTracker {
    unmapped_exposures: Vec<Exposure>,
    processed_exposures: HashSet<Exposure>,
    mapped_sequences: HashSet<Sequence>,
    reverse_map: HashMap<Exposure, Sequence>,
}

/// Serializable snapshot of the tracker.
///
/// The reverse map is derived data and is rebuilt on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub unmapped_exposures: Vec<Exposure>,
    pub processed_exposures: HashSet<Exposure>,
    pub mapped_sequences: HashSet<Sequence>,
}

impl SequenceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends newly discovered exposures that have no sequence yet.
    pub fn add_unmapped(&mut self, exposures: impl IntoIterator<Item = Exposure>) {
        self.unmapped_exposures.extend(exposures);
    }

    /// The exposures not yet assigned to a complete sequence, in arrival
    /// order.
    pub fn unmapped(&self) -> &[Exposure] {
        &self.unmapped_exposures
    }

    /// Records sequences identified as complete, moving their members out of
    /// the unmapped list and into the reverse map.
    pub fn mark_sequences_complete(&mut self, sequences: impl IntoIterator<Item = Sequence>) {
        for sequence in sequences {
            self.unmapped_exposures
                .retain(|exposure| !sequence.contains(exposure));
            self.map_sequence(sequence);
        }
    }

    fn map_sequence(&mut self, sequence: Sequence) {
        for exposure in &sequence {
            self.reverse_map.insert(exposure.clone(), sequence.clone());
        }
        self.mapped_sequences.insert(sequence);
    }

    /// Records that an exposure has been individually processed.
    pub fn mark_processed(&mut self, exposure: Exposure) {
        self.processed_exposures.insert(exposure);
    }

    /// The sequence an exposure belongs to, but only once every member has
    /// been marked processed.
    pub fn sequence_ready_to_process(&self, exposure: &Exposure) -> Option<Sequence> {
        let sequence = self.reverse_map.get(exposure)?;
        if sequence
            .iter()
            .all(|member| self.processed_exposures.contains(member))
        {
            Some(sequence.clone())
        } else {
            None
        }
    }

    /// Clears all bookkeeping for a dispatched sequence.
    pub fn done_with_sequence(&mut self, sequence: &Sequence) {
        for exposure in sequence {
            self.reverse_map.remove(exposure);
            self.processed_exposures.remove(exposure);
        }
        self.mapped_sequences.remove(sequence);
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            unmapped_exposures: self.unmapped_exposures.clone(),
            processed_exposures: self.processed_exposures.clone(),
            mapped_sequences: self.mapped_sequences.clone(),
        }
    }

    /// Restores a tracker from a snapshot, rebuilding the reverse map.
    pub fn from_snapshot(snapshot: TrackerSnapshot) -> Self {
        let mut tracker = Self {
            unmapped_exposures: snapshot.unmapped_exposures,
            processed_exposures: snapshot.processed_exposures,
            mapped_sequences: HashSet::new(),
            reverse_map: HashMap::new(),
        };
        for sequence in snapshot.mapped_sequences {
            tracker.map_sequence(sequence);
        }
        tracker
    }
}
