//! Pure grouping of an ordered exposure stream into sequences.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::exposure::{Exposure, HeaderReader, Sequence, SequenceCounters};

/// What to do with a sequence force-closed early by a counter reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteSequencePolicy {
    /// Dispatch the force-closed group anyway.
    #[default]
    Dispatch,
    /// Discard it.
    Discard,
}

/// Options for [`find_sequences`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderOptions {
    /// Policy for groups force-closed by a mid-sequence counter reset.
    #[serde(default)]
    pub incomplete_policy: IncompleteSequencePolicy,

    /// Drop a trailing open group instead of emitting it. Always set in
    /// realtime mode, where the stream has no finality.
    #[serde(default)]
    pub ignore_incomplete_trailing: bool,
}

impl FinderOptions {
    /// The options realtime mode runs with.
    pub fn realtime() -> Self {
        Self {
            incomplete_policy: IncompleteSequencePolicy::default(),
            ignore_incomplete_trailing: true,
        }
    }
}

/// Groups an ordered exposure stream into closed sequences using each
/// exposure's position/total counters.
///
/// Output sequences are in the relative order in which they close. A
/// self-closing singleton (counters `1/1`) arriving while a group is open is
/// emitted on its own and leaves the open group intact. Missing counters
/// degrade to a singleton group; counter anomalies are logged, never fatal.
pub fn find_sequences(
    exposures: &[Exposure],
    headers: &dyn HeaderReader,
    options: &FinderOptions,
) -> Vec<Sequence> {
    let mut sequences = Vec::new();
    let mut current: Vec<Exposure> = Vec::new();
    let mut last_index = 0u32;

    for exposure in exposures {
        let counters = headers.sequence_counters(exposure).unwrap_or_else(|| {
            warn!(
                "{} missing sequence counters in header, treating as single exposure",
                exposure
            );
            SequenceCounters::singleton()
        });

        // A 1/1 exposure interleaved with an open group (a snapshot taken
        // mid-sequence) closes itself; the surrounding group keeps filling.
        if counters.index == 1 && counters.total == 1 && !current.is_empty() {
            sequences.extend(Sequence::new(vec![exposure.clone()]));
            continue;
        }

        if counters.index < last_index + 1 {
            if counters.index == 1 {
                if !current.is_empty() {
                    warn!(
                        "Exposure counter reset mid-sequence at {}, ending previous sequence early",
                        exposure
                    );
                    let closed = std::mem::take(&mut current);
                    if options.incomplete_policy == IncompleteSequencePolicy::Dispatch {
                        sequences.extend(Sequence::new(closed));
                    }
                }
            } else {
                warn!(
                    "Exposure counter went backwards at {} ({} after {})",
                    exposure, counters.index, last_index
                );
            }
        } else if counters.index > last_index + 1 {
            warn!(
                "Missing exposure before {} (counter jumped from {} to {})",
                exposure, last_index, counters.index
            );
        }

        current.push(exposure.clone());
        last_index = counters.index;
        if counters.index == counters.total {
            sequences.extend(Sequence::new(std::mem::take(&mut current)));
            last_index = 0;
        }
    }

    if !current.is_empty() && !options.ignore_incomplete_trailing {
        sequences.extend(Sequence::new(current));
    }
    sequences
}
