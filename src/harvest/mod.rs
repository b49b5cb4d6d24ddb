//! Rate-limited concurrent pagination engine.
//!
//! A run flows through these parts in order:
//!
//! - [`PaginationPlanner`] discovers the page count
//! - [`WorkQueue`] holds page tasks plus one shutdown marker per worker
//! - [`WorkerPool`] drains the queue, pausing at the shared [`CooldownGate`]
//!   and wrapping every fetch in the [`RetryPolicy`]
//! - [`PersistenceSink`] writes one file per page
//! - [`ResultAggregator`] collects outcomes into a [`RunSummary`]
//!
//! [`Harvester`] wires them together behind the credential cache.

mod config;
mod gate;
mod planner;
mod pool;
mod queue;
mod retry;
mod run;
mod sink;
mod summary;

pub use config::{
    ConfigError, DEFAULT_BATCH_SIZE, DEFAULT_COOLDOWN_EVERY, DEFAULT_WORKERS, DelayRange,
    HarvestConfig, MAX_WORKERS, MIN_WORKERS,
};
pub use gate::CooldownGate;
pub use planner::{PaginationPlanner, PlanningError};
pub use pool::{PageJob, PoolReport, WorkerPool};
pub use queue::{Dequeued, PageTask, QueueError, WorkQueue};
pub use retry::{
    AttemptError, DEFAULT_MAX_ATTEMPTS, ErrorKind, FailureType, RetryDecision, RetryExhausted,
    RetryPolicy, classify, parse_retry_after, upstream_error_kind,
};
pub use run::{Harvester, RunError};
pub use sink::{PersistenceError, PersistenceSink};
pub use summary::{
    FetchOutcome, MAX_MESSAGE_CHARS, PageFailure, PageSuccess, ResultAggregator, RunInfo,
    RunSummary,
};
