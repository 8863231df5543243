//! Worker loop: pulls one item at a time from the in queues and reports it
//! done.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::exposure::{Exposure, Sequence};

use super::queue::WorkQueue;

/// Processing callback the workers invoke per item.
///
/// Errors are logged by the worker; the item is still reported done so the
/// scheduler's bookkeeping keeps moving.
#[async_trait]
pub trait WorkHandler: Send + Sync {
    async fn process_exposure(&self, exposure: &Exposure) -> anyhow::Result<()>;
    async fn process_sequence(&self, sequence: &Sequence) -> anyhow::Result<()>;
}

/// Cooperative stop signal shared by the supervisor and the workers.
///
/// Observed within one tick interval by everyone; workers finish their
/// current item before exiting.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The four queues connecting the supervisor and the worker pool.
#[derive(Debug, Default)]
pub struct Queues {
    pub exposure_in: WorkQueue<Exposure>,
    pub exposure_out: WorkQueue<Exposure>,
    pub sequence_in: WorkQueue<Sequence>,
    pub sequence_out: WorkQueue<Sequence>,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One worker: pulls from the queues, preferring sequences, and suspends
/// briefly when both are empty.
pub struct WorkerLoop {
    id: usize,
    queues: Arc<Queues>,
    handler: Arc<dyn WorkHandler>,
    tick_interval: Duration,
    stop: StopSignal,
}

impl WorkerLoop {
    pub fn new(
        id: usize,
        queues: Arc<Queues>,
        handler: Arc<dyn WorkHandler>,
        tick_interval: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            id,
            queues,
            handler,
            tick_interval,
            stop,
        }
    }

    pub async fn run(self) {
        debug!("Worker {} started", self.id);
        while !self.stop.is_stopped() {
            if !self.process_next().await {
                tokio::time::sleep(self.tick_interval).await;
            }
        }
        debug!("Worker {} stopped", self.id);
    }

    /// Processes at most one item. Sequences take priority over exposures:
    /// sequence work unblocks more downstream exposures.
    async fn process_next(&self) -> bool {
        if let Some(sequence) = self.queues.sequence_in.try_pop() {
            info!("Worker {} processing {}", self.id, sequence);
            if let Err(e) = self.handler.process_sequence(&sequence).await {
                error!("An error occurred while processing {}: {:#}", sequence, e);
            }
            self.queues.sequence_out.push(sequence);
            return true;
        }
        if let Some(exposure) = self.queues.exposure_in.try_pop() {
            info!("Worker {} processing {}", self.id, exposure);
            if let Err(e) = self.handler.process_exposure(&exposure).await {
                error!("An error occurred while processing {}: {:#}", exposure, e);
            }
            self.queues.exposure_out.push(exposure);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        items: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl WorkHandler for RecordingHandler {
        async fn process_exposure(&self, exposure: &Exposure) -> anyhow::Result<()> {
            self.items.lock().unwrap().push(format!("e:{exposure}"));
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }

        async fn process_sequence(&self, sequence: &Sequence) -> anyhow::Result<()> {
            self.items.lock().unwrap().push(format!("s:{sequence}"));
            Ok(())
        }
    }

    fn exposure(name: &str) -> Exposure {
        Exposure::new("n1", name)
    }

    #[tokio::test]
    async fn test_sequence_preferred_over_exposure() {
        let queues = Arc::new(Queues::new());
        queues.exposure_in.push(exposure("a.fits"));
        queues
            .sequence_in
            .push(Sequence::new(vec![exposure("b.fits")]).unwrap());

        let handler = Arc::new(RecordingHandler::default());
        let stop = StopSignal::new();
        let worker = WorkerLoop::new(
            0,
            queues.clone(),
            handler.clone(),
            Duration::from_millis(1),
            stop.clone(),
        );

        assert!(worker.process_next().await);
        assert!(handler.items.lock().unwrap()[0].starts_with("s:"));
        assert_eq!(queues.sequence_out.len(), 1);

        assert!(worker.process_next().await);
        assert_eq!(queues.exposure_out.len(), 1);

        assert!(!worker.process_next().await);
    }

    #[tokio::test]
    async fn test_handler_error_still_reports_done() {
        let queues = Arc::new(Queues::new());
        queues.exposure_in.push(exposure("a.fits"));

        let handler = Arc::new(RecordingHandler {
            items: Mutex::new(Vec::new()),
            fail: true,
        });
        let worker = WorkerLoop::new(
            0,
            queues.clone(),
            handler,
            Duration::from_millis(1),
            StopSignal::new(),
        );
        assert!(worker.process_next().await);
        assert_eq!(queues.exposure_out.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_run() {
        let queues = Arc::new(Queues::new());
        let stop = StopSignal::new();
        let worker = WorkerLoop::new(
            0,
            queues,
            Arc::new(RecordingHandler::default()),
            Duration::from_millis(1),
            stop.clone(),
        );
        let handle = tokio::spawn(worker.run());
        stop.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop in time")
            .unwrap();
    }
}
