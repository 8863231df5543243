//! Triggering policy: what actually happens to an exposure or a completed
//! sequence once a worker picks it up.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::calibration::{CalibrationProcessor, CalibrationState, CalibrationType};
use crate::exposure::{Exposure, ExposureClass, HeaderReader, Sequence};
use crate::recipe::{RecipeCommand, RecipeRunner};
use crate::scheduler::WorkHandler;
use crate::state::{FileLock, StateError, StateStore};

const CALIBRATION_LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Dispatches recipes for exposures and sequences.
///
/// Calibration sequences feed the shared calibration state machine; its
/// state file is guarded by an advisory lock so that concurrent trigger
/// instances sharing a state directory serialize their calibration work.
pub struct TriggerProcessor {
    headers: Arc<dyn HeaderReader>,
    runner: Arc<RecipeRunner>,
    calibration: Mutex<CalibrationProcessor>,
    calibration_store: StateStore<CalibrationState>,
    calibration_lock: FileLock,
}

impl TriggerProcessor {
    /// `calibration_state_path` holds the persisted calibration state; the
    /// advisory lock lives next to it with a `.lock` extension.
    pub fn new(
        headers: Arc<dyn HeaderReader>,
        runner: Arc<RecipeRunner>,
        calibration: CalibrationProcessor,
        calibration_state_path: impl AsRef<Path>,
    ) -> Self {
        let path = calibration_state_path.as_ref().to_path_buf();
        let lock_path = path.with_extension("lock");
        Self {
            headers,
            runner,
            calibration: Mutex::new(calibration),
            calibration_store: StateStore::new(path),
            calibration_lock: FileLock::new(lock_path),
        }
    }

    async fn handle_calibration_sequence(
        &self,
        sequence: &Sequence,
        calibration_type: CalibrationType,
    ) -> anyhow::Result<()> {
        let _guard = self
            .calibration_lock
            .acquire(CALIBRATION_LOCK_TIMEOUT)
            .await
            .context("acquiring the calibration state lock")?;
        let mut processor = self.calibration.lock().await;

        match self.calibration_store.load() {
            Ok(state) => processor.set_state(state),
            Err(StateError::NotFound(path)) => {
                warn!(
                    "Calibration state file {} not found, starting a fresh cycle",
                    path.display()
                );
                processor.reset_state();
            }
            Err(e) => return Err(e).context("loading calibration state"),
        }

        let outcome = processor
            .add_to_queue(sequence.clone(), calibration_type)
            .await;
        self.calibration_store
            .save(processor.state())
            .context("saving calibration state")?;

        if outcome.complete {
            info!(
                "Calibration cycle complete after {} ({} sequences processed)",
                sequence,
                outcome.processed.len()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl WorkHandler for TriggerProcessor {
    async fn process_exposure(&self, exposure: &Exposure) -> anyhow::Result<()> {
        match self.headers.classify(exposure) {
            ExposureClass::Calibration(_) => {
                self.runner
                    .run(&RecipeCommand::Preprocess {
                        exposure: exposure.clone(),
                    })
                    .await;
            }
            ExposureClass::Object => {
                let preprocessed = self
                    .runner
                    .run(&RecipeCommand::Preprocess {
                        exposure: exposure.clone(),
                    })
                    .await;
                if preprocessed {
                    self.runner
                        .run(&RecipeCommand::ExtractRaw {
                            exposure: exposure.clone(),
                        })
                        .await;
                }
            }
            ExposureClass::Unknown => {
                warn!("Could not classify {}, skipping", exposure);
            }
        }
        Ok(())
    }

    async fn process_sequence(&self, sequence: &Sequence) -> anyhow::Result<()> {
        match self.headers.classify(sequence.first()) {
            ExposureClass::Calibration(calibration_type) => {
                self.handle_calibration_sequence(sequence, calibration_type)
                    .await
            }
            ExposureClass::Object => {
                info!("Object sequence {} needs no sequence-level recipe", sequence);
                Ok(())
            }
            ExposureClass::Unknown => {
                warn!("Could not classify sequence {}, skipping", sequence);
                Ok(())
            }
        }
    }
}
