//! End-to-end lifecycle tests: exposures flow from the source through the
//! scheduler and trigger down to recipe invocations, including restart
//! recovery from persisted state.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use nightwatch_core::{
    CalibrationConfig, CalibrationProcessor, CalibrationType, Exposure, ExposureClass,
    ExposureSource, HeaderReader, NewExposures, RecipeCommand, RecipeInvoker, RecipeOutcome,
    RecipeRunner, Scheduler, SchedulerConfig, Sequence, SequenceCounters, SourceError, StateStore,
    TriggerProcessor,
};
use nightwatch_core::recipe::{InvokeError, LogNotifier};

/// Headers encoded in filenames: `<class>-<index>-<total>.fits` where the
/// class prefix is `dd` (dark), `ff` (flat) or `obj` (science).
struct FilenameHeaders;

impl HeaderReader for FilenameHeaders {
    fn sequence_counters(&self, exposure: &Exposure) -> Option<SequenceCounters> {
        let stem = exposure.raw_filename().strip_suffix(".fits")?;
        let mut parts = stem.rsplit('-');
        let total = parts.next()?.parse().ok()?;
        let index = parts.next()?.parse().ok()?;
        Some(SequenceCounters::new(index, total))
    }

    fn classify(&self, exposure: &Exposure) -> ExposureClass {
        let name = exposure.raw_filename();
        if name.starts_with("dd-") {
            ExposureClass::Calibration(CalibrationType::DarkDark)
        } else if name.starts_with("ff-") {
            ExposureClass::Calibration(CalibrationType::FlatFlat)
        } else if name.starts_with("obj-") {
            ExposureClass::Object
        } else {
            ExposureClass::Unknown
        }
    }
}

/// Serves one scripted batch per poll, then empty batches forever.
struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<Exposure>>>,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<Exposure>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
        }
    }
}

#[async_trait]
impl ExposureSource for ScriptedSource {
    async fn get_new_exposures(&self, cursor: Option<&str>) -> Result<NewExposures, SourceError> {
        let exposures = self
            .batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        let cursor = exposures
            .last()
            .map(|e| e.to_string())
            .or_else(|| cursor.map(str::to_string));
        Ok(NewExposures { exposures, cursor })
    }
}

#[derive(Default)]
struct RecordingInvoker {
    commands: Mutex<Vec<String>>,
}

impl RecordingInvoker {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeInvoker for RecordingInvoker {
    async fn invoke(&self, command: &RecipeCommand) -> Result<RecipeOutcome, InvokeError> {
        self.commands
            .lock()
            .unwrap()
            .push(command.command_string());
        Ok(RecipeOutcome::ok())
    }
}

struct TestHarness {
    invoker: Arc<RecordingInvoker>,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self {
            invoker: Arc::new(RecordingInvoker::default()),
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// A fresh invoker for the next scheduler run, keeping the state files.
    fn reset_invoker(&mut self) {
        self.invoker = Arc::new(RecordingInvoker::default());
    }

    fn create_scheduler(&self, batches: Vec<Vec<Exposure>>) -> Scheduler {
        let config = SchedulerConfig {
            num_workers: 2,
            fetch_interval_ms: 20,
            tick_interval_ms: 5,
            worker_tick_interval_ms: 2,
            ..SchedulerConfig::default()
        };
        Scheduler::new(
            config,
            Arc::new(ScriptedSource::new(batches)),
            Arc::new(FilenameHeaders),
            StateStore::new(self.temp_dir.path().join("scheduler.json")),
        )
        .expect("Failed to create scheduler")
    }

    fn create_trigger(&self) -> Arc<TriggerProcessor> {
        let runner = Arc::new(RecipeRunner::new(self.invoker.clone(), Arc::new(LogNotifier)));
        let config = CalibrationConfig {
            // Run every step from scratch, nothing carried over.
            preseeded_steps: Vec::new(),
            ..CalibrationConfig::default()
        };
        let processor = CalibrationProcessor::new(config, runner.clone());
        Arc::new(TriggerProcessor::new(
            Arc::new(FilenameHeaders),
            runner,
            processor,
            self.temp_dir.path().join("calibrations.json"),
        ))
    }

    /// Runs the scheduler until `expected` items are reported done, then
    /// stops it gracefully.
    async fn run_until_completed(&self, mut scheduler: Scheduler, expected: u64) {
        let stop = scheduler.stop_signal();
        let completed = scheduler.completed_counter();
        let handler = self.create_trigger();
        let run = tokio::spawn(async move {
            scheduler.run(handler).await;
        });
        tokio::time::timeout(Duration::from_secs(10), async {
            while completed.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scheduler did not complete the expected items in time");
        stop.stop();
        run.await.unwrap();
    }
}

fn exposure(name: &str) -> Exposure {
    Exposure::new("n1", name)
}

#[tokio::test]
async fn test_full_night_dispatches_recipes_in_dependency_order() {
    let harness = TestHarness::new();
    let scheduler = harness.create_scheduler(vec![vec![
        exposure("dd-1-2.fits"),
        exposure("dd-2-2.fits"),
        exposure("ff-1-1.fits"),
        exposure("obj-1-1.fits"),
    ]]);

    // 4 exposures + 3 sequences reported done.
    harness.run_until_completed(scheduler, 7).await;

    let commands = harness.invoker.commands();
    for name in ["dd-1-2", "dd-2-2", "ff-1-1", "obj-1-1"] {
        assert!(
            commands.contains(&format!("cal_preprocess n1 {name}.fits")),
            "missing preprocess for {name}: {commands:?}"
        );
    }
    assert!(commands.contains(&"cal_extract_RAW n1 obj-1-1.fits".to_string()));
    assert!(commands.contains(&"cal_DARK n1 dd-1-2.fits dd-2-2.fits".to_string()));
    assert!(commands.contains(&"cal_BADPIX n1 ff-1-1.fits dd-2-2.fits".to_string()));

    let dark = commands
        .iter()
        .position(|c| c.starts_with("cal_DARK"))
        .unwrap();
    let badpix = commands
        .iter()
        .position(|c| c.starts_with("cal_BADPIX"))
        .unwrap();
    assert!(dark < badpix);
}

#[tokio::test]
async fn test_restart_resumes_without_redispatching_completed_work() {
    let mut harness = TestHarness::new();

    // First run sees only the opening half of the dark sequence.
    let scheduler = harness.create_scheduler(vec![vec![exposure("dd-1-2.fits")]]);
    harness.run_until_completed(scheduler, 1).await;
    assert_eq!(
        harness.invoker.commands(),
        vec!["cal_preprocess n1 dd-1-2.fits"]
    );

    // Restart: the second half arrives and the sequence completes, but the
    // already-processed exposure is not dispatched again.
    harness.reset_invoker();
    let scheduler = harness.create_scheduler(vec![vec![exposure("dd-2-2.fits")]]);
    harness.run_until_completed(scheduler, 2).await;

    let commands = harness.invoker.commands();
    assert!(!commands.contains(&"cal_preprocess n1 dd-1-2.fits".to_string()));
    assert!(commands.contains(&"cal_preprocess n1 dd-2-2.fits".to_string()));
    assert!(commands.contains(&"cal_DARK n1 dd-1-2.fits dd-2-2.fits".to_string()));
}

#[tokio::test]
async fn test_unclassifiable_exposures_complete_without_recipes() {
    let harness = TestHarness::new();
    let scheduler = harness.create_scheduler(vec![vec![exposure("mystery-1-1.fits")]]);

    // The exposure and its singleton sequence are both reported done.
    harness.run_until_completed(scheduler, 2).await;

    assert!(harness.invoker.commands().is_empty());
}
