//! Work scheduling: a supervisor loop feeding a pool of queue-driven
//! workers, with persistent crash-recovery state.

mod config;
mod queue;
mod runner;
mod state;
mod worker;

pub use config::SchedulerConfig;
pub use queue::WorkQueue;
pub use runner::Scheduler;
pub use state::SchedulerState;
pub use worker::{Queues, StopSignal, WorkHandler, WorkerLoop};
