//! Global cooldown gate shared by every worker.
//!
//! The gate counts completed pages across the pool. Each time the count hits
//! a multiple of the threshold, the worker whose completion crossed it claims
//! the cooldown with a single compare-and-set, closes the gate, sleeps a
//! random duration and reopens it. Workers check the gate before dequeuing,
//! so the whole pool pauses together.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::config::DelayRange;

/// Shared pacing state for one run.
#[derive(Debug)]
pub struct CooldownGate {
    threshold: u64,
    cooldown: DelayRange,
    completed: AtomicU64,
    cooldown_in_progress: AtomicBool,
    cooldowns: AtomicU64,
    open: watch::Sender<bool>,
}

impl CooldownGate {
    /// Creates an open gate that cools down every `threshold` completions.
    ///
    /// A zero threshold is raised to 1.
    #[must_use]
    pub fn new(threshold: u64, cooldown: DelayRange) -> Self {
        let (open, _) = watch::channel(true);
        Self {
            threshold: threshold.max(1),
            cooldown,
            completed: AtomicU64::new(0),
            cooldown_in_progress: AtomicBool::new(false),
            cooldowns: AtomicU64::new(0),
            open,
        }
    }

    /// Total completions recorded so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of cooldowns performed so far.
    #[must_use]
    pub fn cooldowns(&self) -> u64 {
        self.cooldowns.load(Ordering::SeqCst)
    }

    /// Whether workers may currently proceed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.borrow()
    }

    /// Waits while the gate is closed.
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let mut open = self.open.subscribe();
        tokio::select! {
            result = open.wait_for(|is_open| *is_open) => result.is_ok(),
            () = cancel.cancelled() => false,
        }
    }

    /// Records one completion and performs the cooldown if this completion
    /// crossed the threshold.
    ///
    /// Returns the cooldown duration when this call performed it.
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn on_task_completed(&self, cancel: &CancellationToken) -> Option<Duration> {
        let count = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.threshold != 0 {
            return None;
        }

        if self
            .cooldown_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(completed = count, "cooldown already in progress, skipping");
            return None;
        }

        self.open.send_replace(false);
        self.cooldowns.fetch_add(1, Ordering::SeqCst);
        let duration = self.cooldown.sample();
        info!(
            completed = count,
            duration_ms = duration.as_millis(),
            "global cooldown, pausing all workers"
        );

        tokio::select! {
            () = cancel.cancelled() => debug!("cooldown cut short by cancellation"),
            () = tokio::time::sleep(duration) => {}
        }

        // Reopen before releasing the claim so the next cooldown's close wins.
        self.open.send_replace(true);
        self.cooldown_in_progress.store(false, Ordering::Release);
        debug!(completed = count, "cooldown finished, gate reopened");
        Some(duration)
    }
}
