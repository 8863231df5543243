//! Scheduler supervisor: polls the exposure source, maintains the sequence
//! bookkeeping, and fans work out to the worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::exposure::{Exposure, HeaderReader, Sequence};
use crate::sequence::{find_sequences, SequenceStateTracker};
use crate::source::ExposureSource;
use crate::state::{StateError, StateStore};

use super::config::SchedulerConfig;
use super::state::SchedulerState;
use super::worker::{Queues, StopSignal, WorkHandler, WorkerLoop};

/// The scheduler: one supervisory loop plus a bounded worker pool.
///
/// All externally observable progress (in-flight bookkeeping, tracker state,
/// cursor) is persisted after every mutation, so a crash at any point
/// resumes with at-least-once redelivery of whatever was in flight.
pub struct Scheduler {
    config: SchedulerConfig,
    source: Arc<dyn ExposureSource>,
    headers: Arc<dyn HeaderReader>,
    store: StateStore<SchedulerState>,
    queues: Arc<Queues>,
    tracker: SequenceStateTracker,
    in_flight_exposures: Vec<Exposure>,
    in_flight_sequences: Vec<Sequence>,
    cursor: Option<String>,
    stop: StopSignal,
    completed: Arc<AtomicU64>,
}

impl Scheduler {
    /// Creates a scheduler, resuming from persisted state when present.
    ///
    /// A missing state file is the normal first run; anything in flight at
    /// the time of the last save is re-injected onto the in queues.
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn ExposureSource>,
        headers: Arc<dyn HeaderReader>,
        store: StateStore<SchedulerState>,
    ) -> Result<Self, StateError> {
        let mut scheduler = Self {
            config,
            source,
            headers,
            store,
            queues: Arc::new(Queues::new()),
            tracker: SequenceStateTracker::new(),
            in_flight_exposures: Vec::new(),
            in_flight_sequences: Vec::new(),
            cursor: None,
            stop: StopSignal::new(),
            completed: Arc::new(AtomicU64::new(0)),
        };
        match scheduler.store.load() {
            Ok(state) => scheduler.restore(state),
            Err(StateError::NotFound(path)) => {
                warn!(
                    "Scheduler state file {} not found. This should only appear the first time \
                     the scheduler is run.",
                    path.display()
                );
            }
            Err(e) => return Err(e),
        }
        Ok(scheduler)
    }

    fn restore(&mut self, state: SchedulerState) {
        self.tracker = SequenceStateTracker::from_snapshot(state.tracker);
        self.cursor = state.cursor;
        for exposure in &state.in_flight_exposures {
            self.queues.exposure_in.push(exposure.clone());
        }
        for sequence in &state.in_flight_sequences {
            self.queues.sequence_in.push(sequence.clone());
        }
        info!(
            "Resumed scheduler state: {} exposures and {} sequences re-injected",
            state.in_flight_exposures.len(),
            state.in_flight_sequences.len()
        );
        self.in_flight_exposures = state.in_flight_exposures;
        self.in_flight_sequences = state.in_flight_sequences;
    }

    /// Handle for requesting a graceful stop. Observed within one tick
    /// interval.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Counter of items (exposures and sequences) reported done, for
    /// status reporting and tests.
    pub fn completed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.completed)
    }

    /// Runs the supervisor loop until the stop signal is observed.
    pub async fn run(&mut self, handler: Arc<dyn WorkHandler>) {
        info!(
            "Scheduler started with {} workers, fetch every {}ms",
            self.config.num_workers, self.config.fetch_interval_ms
        );
        let fetch_interval = Duration::from_millis(self.config.fetch_interval_ms);
        let tick_interval = Duration::from_millis(self.config.tick_interval_ms);

        let mut workers: Vec<JoinHandle<()>> = (0..self.config.num_workers)
            .map(|id| self.spawn_worker(id, Arc::clone(&handler)))
            .collect();

        while !self.stop.is_stopped() {
            self.fetch_and_handle_new_exposures().await;
            let fetch_deadline = Instant::now() + fetch_interval;
            while Instant::now() < fetch_deadline && !self.stop.is_stopped() {
                self.queue_tick();
                self.replace_finished_workers(&mut workers, &handler).await;
                tokio::time::sleep(tick_interval).await;
            }
        }

        info!("Stop signal observed, waiting for workers to finish their current items");
        for (id, handle) in workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Worker {} panicked during shutdown: {}", id, e);
            }
        }
        // Collect whatever the workers completed on the way out.
        self.queue_tick();
        self.persist();
        info!("Scheduler stopped");
    }

    fn spawn_worker(&self, id: usize, handler: Arc<dyn WorkHandler>) -> JoinHandle<()> {
        let worker = WorkerLoop::new(
            id,
            Arc::clone(&self.queues),
            handler,
            Duration::from_millis(self.config.worker_tick_interval_ms),
            self.stop.clone(),
        );
        tokio::spawn(worker.run())
    }

    /// Respawns workers that exited without a stop signal, keeping the pool
    /// at its configured size.
    async fn replace_finished_workers(
        &self,
        workers: &mut [JoinHandle<()>],
        handler: &Arc<dyn WorkHandler>,
    ) {
        for (id, slot) in workers.iter_mut().enumerate() {
            if !slot.is_finished() {
                continue;
            }
            let finished = std::mem::replace(slot, self.spawn_worker(id, Arc::clone(handler)));
            match finished.await {
                Ok(()) => warn!("Worker {} exited unexpectedly, replaced", id),
                Err(e) => error!("Worker {} panicked, replaced: {}", id, e),
            }
        }
    }

    /// Polls the source, grows the sequence bookkeeping and enqueues every
    /// new exposure.
    async fn fetch_and_handle_new_exposures(&mut self) {
        let batch = match self.source.get_new_exposures(self.cursor.as_deref()).await {
            Ok(batch) => batch,
            Err(e) => {
                // Transient by definition; retried on the next poll.
                warn!("Fetching new exposures failed, will retry: {}", e);
                return;
            }
        };
        if let Some(cursor) = batch.cursor {
            self.cursor = Some(cursor);
        }
        if batch.exposures.is_empty() {
            return;
        }
        info!("Fetched {} new exposures", batch.exposures.len());

        self.tracker.add_unmapped(batch.exposures.iter().cloned());
        let completed_sequences =
            find_sequences(self.tracker.unmapped(), &*self.headers, &self.config.finder);
        self.tracker.mark_sequences_complete(completed_sequences);
        for exposure in batch.exposures {
            self.queues.exposure_in.push(exposure.clone());
            self.in_flight_exposures.push(exposure);
        }
        self.persist();
    }

    /// Drains the done queues, advancing sequence readiness and in-flight
    /// bookkeeping.
    fn queue_tick(&mut self) -> usize {
        let mut updated = 0;

        for sequence in self.queues.sequence_out.drain() {
            if let Some(position) = self
                .in_flight_sequences
                .iter()
                .position(|candidate| *candidate == sequence)
            {
                self.in_flight_sequences.remove(position);
            }
            updated += 1;
        }

        for exposure in self.queues.exposure_out.drain() {
            if let Some(position) = self
                .in_flight_exposures
                .iter()
                .position(|candidate| *candidate == exposure)
            {
                self.in_flight_exposures.remove(position);
            }
            self.tracker.mark_processed(exposure.clone());
            if let Some(sequence) = self.tracker.sequence_ready_to_process(&exposure) {
                self.queues.sequence_in.push(sequence.clone());
                self.in_flight_sequences.push(sequence.clone());
                self.tracker.done_with_sequence(&sequence);
            }
            updated += 1;
        }

        if updated > 0 {
            self.persist();
            self.completed.fetch_add(updated as u64, Ordering::SeqCst);
        }
        updated
    }

    /// Saves a snapshot. A failed save degrades crash-recovery fidelity but
    /// never halts processing.
    fn persist(&self) {
        let state = SchedulerState {
            tracker: self.tracker.snapshot(),
            in_flight_exposures: self.in_flight_exposures.clone(),
            in_flight_sequences: self.in_flight_sequences.clone(),
            cursor: self.cursor.clone(),
        };
        if let Err(e) = self.store.save(&state) {
            error!("Failed to save scheduler state: {}", e);
        }
    }
}
