//! Calibration classifications, steps and persisted state.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::exposure::Sequence;

/// Classification of a calibration sequence, by the contents of the two
/// fiber channels.
///
/// Closed set: unknown DPR types never reach this enum, they are classified
/// as `ExposureClass::Unknown` upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalibrationType {
    /// Dark in both channels.
    DarkDark,
    /// Dark in the science channel, flat in the reference channel.
    DarkFlat,
    /// Flat in the science channel, dark in the reference channel.
    FlatDark,
    /// Flat in both channels.
    FlatFlat,
    /// Fabry-Perot in both channels.
    FpFp,
    /// Hollow cathode lamp in both channels.
    HcOneHcOne,
}

impl CalibrationType {
    /// All calibration types, in no particular order.
    pub const ALL: [CalibrationType; 6] = [
        CalibrationType::DarkDark,
        CalibrationType::DarkFlat,
        CalibrationType::FlatDark,
        CalibrationType::FlatFlat,
        CalibrationType::FpFp,
        CalibrationType::HcOneHcOne,
    ];
}

/// One stage of the nightly calibration pipeline.
///
/// The declaration order here is the fixed topological attempt order: a step
/// can never run before the ones it depends on have completed at least once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CalibrationStep {
    /// Dark frame combination.
    Dark,
    /// Bad pixel mask, from the latest dark and flat.
    Badpix,
    /// Order localisation.
    Loc,
    /// Slit shape, from FP and HC sequences.
    Shape,
    /// Flat fielding.
    Flat,
    /// Wavelength solution.
    Wave,
}

impl CalibrationStep {
    /// Every step, in dependency order.
    pub const ALL: [CalibrationStep; 6] = [
        CalibrationStep::Dark,
        CalibrationStep::Badpix,
        CalibrationStep::Loc,
        CalibrationStep::Shape,
        CalibrationStep::Flat,
        CalibrationStep::Wave,
    ];
}

/// Persisted calibration progress for the current cycle.
///
/// Invariant: for every type, `pending_by_type[t]` is a suffix of
/// `sequences_by_type[t]`: nothing is queued without having been recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Steps that have completed at least once this cycle.
    pub completed_steps: HashSet<CalibrationStep>,
    /// Every sequence seen this cycle, per type, in arrival order.
    pub sequences_by_type: HashMap<CalibrationType, Vec<Sequence>>,
    /// Sequences not yet consumed by their step, per type.
    pub pending_by_type: HashMap<CalibrationType, VecDeque<Sequence>>,
}

impl CalibrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sequence of the given type and queues it for processing.
    pub fn record(&mut self, sequence: Sequence, calibration_type: CalibrationType) {
        self.sequences_by_type
            .entry(calibration_type)
            .or_default()
            .push(sequence.clone());
        self.pending_by_type
            .entry(calibration_type)
            .or_default()
            .push_back(sequence);
    }

    /// The most recently recorded sequence of a type, if any.
    pub fn last_sequence_of(&self, calibration_type: CalibrationType) -> Option<&Sequence> {
        self.sequences_by_type
            .get(&calibration_type)
            .and_then(|sequences| sequences.last())
    }

    /// The final exposure of the most recently recorded sequence of a type.
    pub fn last_exposure_of(
        &self,
        calibration_type: CalibrationType,
    ) -> Option<&crate::exposure::Exposure> {
        self.last_sequence_of(calibration_type)
            .map(|sequence| sequence.last())
    }
}
