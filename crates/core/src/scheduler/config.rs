//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::sequence::FinderOptions;

/// Configuration for the scheduler and its worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Size of the worker pool.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// How often to poll the exposure source (milliseconds).
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_ms: u64,

    /// How often the supervisor drains the done queues between fetches
    /// (milliseconds). Also bounds stop-signal latency.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// How long an idle worker sleeps before re-polling its queues
    /// (milliseconds).
    #[serde(default = "default_worker_tick_interval")]
    pub worker_tick_interval_ms: u64,

    /// Sequence grouping options. Realtime keeps trailing open groups back.
    #[serde(default = "FinderOptions::realtime")]
    pub finder: FinderOptions,
}

fn default_num_workers() -> usize {
    4
}

fn default_fetch_interval() -> u64 {
    10_000
}

fn default_tick_interval() -> u64 {
    500
}

fn default_worker_tick_interval() -> u64 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            fetch_interval_ms: default_fetch_interval(),
            tick_interval_ms: default_tick_interval(),
            worker_tick_interval_ms: default_worker_tick_interval(),
            finder: FinderOptions::realtime(),
        }
    }
}
