//! Exposure identity and sequence types.
//!
//! An exposure is one raw observation file, identified by the night it was
//! taken and its raw filename. Everything else about it (derived paths,
//! header contents) is looked up through collaborators; identity alone is
//! what the orchestration layer tracks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationType;

/// One raw observation file, identified by `(night, raw_filename)`.
///
/// Two values with the same identity are interchangeable regardless of any
/// derived data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exposure {
    night: String,
    raw_filename: String,
}

impl Exposure {
    pub fn new(night: impl Into<String>, raw_filename: impl Into<String>) -> Self {
        Self {
            night: night.into(),
            raw_filename: raw_filename.into(),
        }
    }

    pub fn night(&self) -> &str {
        &self.night
    }

    pub fn raw_filename(&self) -> &str {
        &self.raw_filename
    }
}

impl fmt::Display for Exposure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.night, self.raw_filename)
    }
}

/// An ordered group of exposures captured as one logical observation unit.
///
/// Always non-empty; members are in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence(Vec<Exposure>);

impl Sequence {
    /// Builds a sequence from an ordered, non-empty list of exposures.
    ///
    /// Returns `None` for an empty list.
    pub fn new(exposures: Vec<Exposure>) -> Option<Self> {
        if exposures.is_empty() {
            None
        } else {
            Some(Self(exposures))
        }
    }

    pub fn first(&self) -> &Exposure {
        &self.0[0]
    }

    pub fn last(&self) -> &Exposure {
        &self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Exposure> {
        self.0.iter()
    }

    pub fn exposures(&self) -> &[Exposure] {
        &self.0
    }

    pub fn contains(&self, exposure: &Exposure) -> bool {
        self.0.contains(exposure)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, exposure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", exposure)?;
        }
        write!(f, "]")
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Exposure;
    type IntoIter = std::slice::Iter<'a, Exposure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The 1-based position/total counter pair an exposure declares for its
/// sequence membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounters {
    /// 1-based index of this exposure within its group.
    pub index: u32,
    /// Total number of exposures in the group.
    pub total: u32,
}

impl SequenceCounters {
    pub fn new(index: u32, total: u32) -> Self {
        Self { index, total }
    }

    /// The fallback used when header data is missing: a singleton group.
    pub fn singleton() -> Self {
        Self { index: 1, total: 1 }
    }
}

/// Classification of an exposure, determining which reduction steps
/// consume it.
///
/// Closed set; anything unrecognised maps to `Unknown` and is skipped with a
/// warning rather than failing the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureClass {
    /// A calibration exposure of a known type.
    Calibration(CalibrationType),
    /// A science (object) exposure.
    Object,
    /// Unrecognised classification.
    Unknown,
}

/// Collaborator seam for reading per-exposure header metadata.
///
/// Implementations read the instrument headers (or a test fixture) and
/// report the sequence counters and classification for an exposure.
pub trait HeaderReader: Send + Sync {
    /// The `(index, total)` counter pair, or `None` if the header data is
    /// missing.
    fn sequence_counters(&self, exposure: &Exposure) -> Option<SequenceCounters>;

    /// The exposure classification.
    fn classify(&self, exposure: &Exposure) -> ExposureClass;
}
