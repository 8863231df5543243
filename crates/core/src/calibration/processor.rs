//! Dependency-ordered calibration step pipeline.
//!
//! Completed calibration sequences are queued per type; every queue addition
//! triggers an attempt to drain the whole step pipeline in fixed topological
//! order. A step that is missing its prerequisite data reports `NotReady`,
//! which ends the attempt; the queues keep accumulating until a later cycle
//! can make progress.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::exposure::Sequence;
use crate::recipe::{Fiber, RecipeCommand, RecipeRunner};

use super::types::{CalibrationState, CalibrationStep, CalibrationType};

/// What to do with a queued sequence whose recipe failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedSequencePolicy {
    /// The sequence is consumed regardless; the failure has been reported.
    #[default]
    Discard,
    /// The sequence is requeued and retried on the next cycle.
    Retry,
}

/// Configuration for the calibration processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Steps the pipeline attempts. Steps not listed are skipped entirely.
    #[serde(default = "default_enabled_steps")]
    pub enabled_steps: HashSet<CalibrationStep>,

    /// Steps marked already-complete when a new cycle starts, modelling
    /// results that persist across cycles.
    #[serde(default = "default_preseeded_steps")]
    pub preseeded_steps: Vec<CalibrationStep>,

    /// Policy for sequences whose recipe failed.
    #[serde(default)]
    pub failed_sequence_policy: FailedSequencePolicy,
}

fn default_enabled_steps() -> HashSet<CalibrationStep> {
    CalibrationStep::ALL.into_iter().collect()
}

fn default_preseeded_steps() -> Vec<CalibrationStep> {
    vec![CalibrationStep::Dark, CalibrationStep::Badpix]
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled_steps: default_enabled_steps(),
            preseeded_steps: default_preseeded_steps(),
            failed_sequence_policy: FailedSequencePolicy::default(),
        }
    }
}

/// Result of one drain attempt.
#[derive(Debug, Clone, Default)]
pub struct AttemptOutcome {
    /// Every enabled step either ran or was already complete; the state has
    /// been reset for the next cycle.
    pub complete: bool,
    /// Sequences consumed during this attempt.
    pub processed: Vec<Sequence>,
}

/// Explicit two-state step result; `NotReady` is an expected outcome, not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepStatus {
    Advanced,
    NotReady,
}

/// Drives calibration sequences through the step pipeline.
pub struct CalibrationProcessor {
    config: CalibrationConfig,
    runner: Arc<RecipeRunner>,
    state: CalibrationState,
}

impl CalibrationProcessor {
    pub fn new(config: CalibrationConfig, runner: Arc<RecipeRunner>) -> Self {
        let mut processor = Self {
            config,
            runner,
            state: CalibrationState::new(),
        };
        processor.reset_state();
        processor
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Replaces the internal state, e.g. with one reloaded from the store.
    pub fn set_state(&mut self, state: CalibrationState) {
        self.state = state;
    }

    /// Clears the state for a new cycle and pre-seeds the configured steps.
    pub fn reset_state(&mut self) {
        self.state = CalibrationState::new();
        for step in &self.config.preseeded_steps {
            self.state.completed_steps.insert(*step);
        }
    }

    /// Records and queues a completed calibration sequence, then attempts to
    /// drain the whole pipeline.
    pub async fn add_to_queue(
        &mut self,
        sequence: Sequence,
        calibration_type: CalibrationType,
    ) -> AttemptOutcome {
        self.state.record(sequence, calibration_type);
        self.attempt_processing().await
    }

    /// Attempts one pass over the steps in dependency order.
    ///
    /// Stops at the first step that is not ready; steps later in the order
    /// are left un-attempted this pass.
    pub async fn attempt_processing(&mut self) -> AttemptOutcome {
        let mut processed = Vec::new();
        let complete = self.process_steps(&mut processed).await == StepStatus::Advanced;
        if complete {
            debug!("Calibration cycle complete, resetting state");
            self.reset_state();
        }
        AttemptOutcome {
            complete,
            processed,
        }
    }

    async fn process_steps(&mut self, processed: &mut Vec<Sequence>) -> StepStatus {
        use CalibrationStep::*;
        use CalibrationType::*;

        let steps = [
            (Dark, StepAction::Simple(DarkDark)),
            (Badpix, StepAction::Badpix),
            (Loc, StepAction::Simple(DarkFlat)),
            (Loc, StepAction::Simple(FlatDark)),
            (Shape, StepAction::Shape),
            (Flat, StepAction::Simple(FlatFlat)),
        ];
        for (step, action) in steps {
            if !self.config.enabled_steps.contains(&step) {
                continue;
            }
            let advanced = match action {
                StepAction::Simple(calibration_type) => {
                    !self
                        .drain_queue(calibration_type, processed)
                        .await
                        .is_empty()
                }
                StepAction::Badpix => self.badpix_step().await,
                StepAction::Shape => self.shape_step(processed).await,
            };
            if advanced {
                self.state.completed_steps.insert(step);
            } else if !self.state.completed_steps.contains(&step) {
                debug!("Calibration step {:?} not ready, stopping pass", step);
                return StepStatus::NotReady;
            }
        }

        if self.config.enabled_steps.contains(&Wave) {
            return self.wave_step().await;
        }
        StepStatus::Advanced
    }

    /// Bad pixel mask: consults the latest sequence of each referenced type
    /// rather than draining a queue, and fires at most once per cycle.
    async fn badpix_step(&mut self) -> bool {
        if self.state.completed_steps.contains(&CalibrationStep::Badpix) {
            return false;
        }
        let last_dark = self.state.last_exposure_of(CalibrationType::DarkDark);
        let last_flat = self.state.last_exposure_of(CalibrationType::FlatFlat);
        let (Some(dark), Some(flat)) = (last_dark, last_flat) else {
            return false;
        };
        let command = RecipeCommand::Badpix {
            flat: flat.clone(),
            dark: dark.clone(),
        };
        self.runner.run(&command).await;
        true
    }

    /// Slit shape: FP sequences are recorded without a recipe, then every
    /// pending HC sequence is shaped against the latest FP sequence.
    async fn shape_step(&mut self, processed: &mut Vec<Sequence>) -> bool {
        self.drain_queue(CalibrationType::FpFp, processed).await;
        let Some(fp_sequence) = self.state.last_sequence_of(CalibrationType::FpFp).cloned() else {
            return false;
        };
        let drained = self
            .drain_with(CalibrationType::HcOneHcOne, processed, |hc_sequence| {
                Some(RecipeCommand::Shape {
                    hc: hc_sequence.last().clone(),
                    fp_sequence: fp_sequence.clone(),
                })
            })
            .await;
        !drained.is_empty()
    }

    /// Wavelength solution: terminal step, run from the latest FP and HC
    /// exposures once everything earlier has completed.
    async fn wave_step(&mut self) -> StepStatus {
        let last_fp = self.state.last_exposure_of(CalibrationType::FpFp).cloned();
        let last_hc = self
            .state
            .last_exposure_of(CalibrationType::HcOneHcOne)
            .cloned();
        let (Some(fp), Some(hc)) = (last_fp, last_hc) else {
            warn!("Wave step reached without FP and HC data, deferring");
            return StepStatus::NotReady;
        };
        self.runner
            .run(&RecipeCommand::ExtractRaw {
                exposure: fp.clone(),
            })
            .await;
        self.runner
            .run(&RecipeCommand::ExtractRaw {
                exposure: hc.clone(),
            })
            .await;
        for fiber in Fiber::ALL {
            self.runner
                .run(&RecipeCommand::HcE2ds {
                    hc: hc.clone(),
                    fiber,
                })
                .await;
        }
        for fiber in Fiber::ALL {
            self.runner
                .run(&RecipeCommand::WaveE2ds {
                    fp: fp.clone(),
                    hc: hc.clone(),
                    fiber,
                })
                .await;
        }
        self.state.completed_steps.insert(CalibrationStep::Wave);
        StepStatus::Advanced
    }

    /// Drains the pending queue for a type, running its recipe per sequence.
    async fn drain_queue(
        &mut self,
        calibration_type: CalibrationType,
        processed: &mut Vec<Sequence>,
    ) -> Vec<Sequence> {
        self.drain_with(calibration_type, processed, |sequence| {
            recipe_for(calibration_type, sequence)
        })
        .await
    }

    async fn drain_with<F>(
        &mut self,
        calibration_type: CalibrationType,
        processed: &mut Vec<Sequence>,
        mut recipe: F,
    ) -> Vec<Sequence>
    where
        F: FnMut(&Sequence) -> Option<RecipeCommand>,
    {
        let mut drained = Vec::new();
        loop {
            let Some(sequence) = self
                .state
                .pending_by_type
                .get_mut(&calibration_type)
                .and_then(|queue| queue.pop_front())
            else {
                break;
            };
            let succeeded = match recipe(&sequence) {
                Some(command) => self.runner.run(&command).await,
                None => true,
            };
            if !succeeded && self.config.failed_sequence_policy == FailedSequencePolicy::Retry {
                warn!(
                    "Recipe failed for {:?} sequence {}, requeueing for next cycle",
                    calibration_type, sequence
                );
                self.state
                    .pending_by_type
                    .entry(calibration_type)
                    .or_default()
                    .push_front(sequence);
                break;
            }
            drained.push(sequence);
        }
        processed.extend(drained.iter().cloned());
        drained
    }
}

/// Which action a pipeline entry performs.
#[derive(Debug, Clone, Copy)]
enum StepAction {
    /// Drain the queue of one type with its recipe.
    Simple(CalibrationType),
    Badpix,
    Shape,
}

fn recipe_for(calibration_type: CalibrationType, sequence: &Sequence) -> Option<RecipeCommand> {
    match calibration_type {
        CalibrationType::DarkDark => Some(RecipeCommand::Dark {
            sequence: sequence.clone(),
        }),
        CalibrationType::DarkFlat | CalibrationType::FlatDark => Some(RecipeCommand::LocRaw {
            sequence: sequence.clone(),
        }),
        CalibrationType::FlatFlat => Some(RecipeCommand::FlatField {
            sequence: sequence.clone(),
        }),
        // FP sequences are recorded for the shape and wave steps, no recipe
        // of their own.
        CalibrationType::FpFp => None,
        CalibrationType::HcOneHcOne => None,
    }
}
