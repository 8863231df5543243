//! Types for external reduction recipe invocation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exposure::{Exposure, Sequence};

/// The fiber channels a per-fiber recipe is run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fiber {
    Ab,
    A,
    B,
    C,
}

impl Fiber {
    /// All fibers, in the order recipes are run for them.
    pub const ALL: [Fiber; 4] = [Fiber::Ab, Fiber::A, Fiber::B, Fiber::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Fiber::Ab => "AB",
            Fiber::A => "A",
            Fiber::B => "B",
            Fiber::C => "C",
        }
    }
}

impl fmt::Display for Fiber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of an external reduction recipe.
///
/// Closed set over the operations the trigger and the calibration pipeline
/// dispatch; each variant knows its program name and argument rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeCommand {
    /// Header fixing and detector preprocessing of one raw exposure.
    Preprocess { exposure: Exposure },
    /// Spectrum extraction from one preprocessed exposure.
    ExtractRaw { exposure: Exposure },
    /// Dark combination over a sequence.
    Dark { sequence: Sequence },
    /// Bad pixel mask from the latest flat and dark exposures.
    Badpix { flat: Exposure, dark: Exposure },
    /// Order localisation over a sequence.
    LocRaw { sequence: Sequence },
    /// Slit shape from the last HC exposure and an FP sequence.
    Shape { hc: Exposure, fp_sequence: Sequence },
    /// Flat fielding over a sequence.
    FlatField { sequence: Sequence },
    /// Wavelength lines from an extracted HC exposure, per fiber.
    HcE2ds { hc: Exposure, fiber: Fiber },
    /// Wavelength solution from extracted FP and HC exposures, per fiber.
    WaveE2ds {
        fp: Exposure,
        hc: Exposure,
        fiber: Fiber,
    },
}

impl RecipeCommand {
    /// The external program name for this recipe.
    pub fn program(&self) -> &'static str {
        match self {
            RecipeCommand::Preprocess { .. } => "cal_preprocess",
            RecipeCommand::ExtractRaw { .. } => "cal_extract_RAW",
            RecipeCommand::Dark { .. } => "cal_DARK",
            RecipeCommand::Badpix { .. } => "cal_BADPIX",
            RecipeCommand::LocRaw { .. } => "cal_loc_RAW",
            RecipeCommand::Shape { .. } => "cal_SHAPE",
            RecipeCommand::FlatField { .. } => "cal_FF_RAW",
            RecipeCommand::HcE2ds { .. } => "cal_HC_E2DS",
            RecipeCommand::WaveE2ds { .. } => "cal_WAVE_E2DS",
        }
    }

    /// The night the recipe operates on.
    pub fn night(&self) -> &str {
        match self {
            RecipeCommand::Preprocess { exposure } | RecipeCommand::ExtractRaw { exposure } => {
                exposure.night()
            }
            RecipeCommand::Dark { sequence }
            | RecipeCommand::LocRaw { sequence }
            | RecipeCommand::FlatField { sequence } => sequence.first().night(),
            RecipeCommand::Badpix { flat, .. } => flat.night(),
            RecipeCommand::Shape { hc, .. } => hc.night(),
            RecipeCommand::HcE2ds { hc, .. } => hc.night(),
            RecipeCommand::WaveE2ds { fp, .. } => fp.night(),
        }
    }

    /// Positional arguments after the night: the raw filenames involved.
    pub fn filenames(&self) -> Vec<&str> {
        match self {
            RecipeCommand::Preprocess { exposure } | RecipeCommand::ExtractRaw { exposure } => {
                vec![exposure.raw_filename()]
            }
            RecipeCommand::Dark { sequence }
            | RecipeCommand::LocRaw { sequence }
            | RecipeCommand::FlatField { sequence } => sequence
                .iter()
                .map(|exposure| exposure.raw_filename())
                .collect(),
            RecipeCommand::Badpix { flat, dark } => {
                vec![flat.raw_filename(), dark.raw_filename()]
            }
            RecipeCommand::Shape { hc, fp_sequence } => {
                let mut names = vec![hc.raw_filename()];
                names.extend(fp_sequence.iter().map(|exposure| exposure.raw_filename()));
                names
            }
            RecipeCommand::HcE2ds { hc, .. } => vec![hc.raw_filename()],
            RecipeCommand::WaveE2ds { fp, hc, .. } => {
                vec![fp.raw_filename(), hc.raw_filename()]
            }
        }
    }

    /// Named arguments, rendered as `--key=value`.
    pub fn named_args(&self) -> Vec<String> {
        match self {
            RecipeCommand::HcE2ds { fiber, .. } | RecipeCommand::WaveE2ds { fiber, .. } => {
                vec![format!("--fiber={}", fiber)]
            }
            _ => Vec::new(),
        }
    }

    /// A command-line rendering of the invocation, for logging and failure
    /// reports.
    pub fn command_string(&self) -> String {
        let mut parts = vec![self.program().to_string(), self.night().to_string()];
        parts.extend(self.filenames().iter().map(|name| name.to_string()));
        parts.extend(self.named_args());
        parts.join(" ")
    }
}

impl fmt::Display for RecipeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_string())
    }
}

/// How a recipe invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFailureKind {
    /// The host process for the recipe exited abnormally.
    SystemExit,
    /// The recipe ran but its quality control rejected the result.
    QcFailure,
    /// Any other error while running the recipe.
    Error,
}

impl fmt::Display for RecipeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeFailureKind::SystemExit => f.write_str("system exit"),
            RecipeFailureKind::QcFailure => f.write_str("QC failure"),
            RecipeFailureKind::Error => f.write_str("error"),
        }
    }
}

/// A failed recipe invocation, as reported to the notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFailure {
    pub kind: RecipeFailureKind,
    pub command_string: String,
}

impl fmt::Display for RecipeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.command_string)
    }
}

/// Result of one recipe invocation.
#[derive(Debug, Clone, Default)]
pub struct RecipeOutcome {
    /// Whether the recipe ran to completion.
    pub success: bool,
    /// Whether quality control accepted the result.
    pub qc_passed: bool,
    /// Diagnostic output, typically a stderr tail.
    pub diagnostics: Option<String>,
}

impl RecipeOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            qc_passed: true,
            diagnostics: None,
        }
    }
}
