//! Per-page outcomes and the final run summary.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::warn;

use super::retry::ErrorKind;
use crate::identifier::ResourceId;

/// Longest failure message kept in a summary, in characters.
pub const MAX_MESSAGE_CHARS: usize = 150;

/// A page that was fetched and written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSuccess {
    /// 1-based page number.
    pub page: u32,
    /// File holding the payload.
    pub path: PathBuf,
    /// Attempts used, including the first.
    pub attempts: u32,
}

/// A page that ended in failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    /// 1-based page number.
    pub page: u32,
    /// Classified failure kind.
    pub kind: ErrorKind,
    /// Last error message, truncated.
    pub message: String,
    /// Attempts used; 0 when the page was never attempted.
    pub attempts: u32,
}

/// Result of processing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Page fetched and persisted.
    Success(PageSuccess),
    /// Page failed.
    Failure(PageFailure),
}

impl FetchOutcome {
    /// Creates a success outcome.
    #[must_use]
    pub fn success(page: u32, path: PathBuf, attempts: u32) -> Self {
        Self::Success(PageSuccess {
            page,
            path,
            attempts,
        })
    }

    /// Creates a failure outcome; the message is cut to [`MAX_MESSAGE_CHARS`].
    #[must_use]
    pub fn failure(page: u32, kind: ErrorKind, message: &impl fmt::Display, attempts: u32) -> Self {
        Self::Failure(PageFailure {
            page,
            kind,
            message: truncate_message(&message.to_string()),
            attempts,
        })
    }

    /// The page this outcome belongs to.
    #[must_use]
    pub fn page(&self) -> u32 {
        match self {
            Self::Success(success) => success.page,
            Self::Failure(failure) => failure.page,
        }
    }
}

fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_CHARS).collect()
}

/// Run-level facts the aggregator does not track itself.
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Target resource.
    pub resource: ResourceId,
    /// Pages reported by discovery.
    pub total_pages: u32,
    /// Pages scheduled (`1..=requested_pages`).
    pub requested_pages: u32,
    /// Worker count.
    pub workers: usize,
    /// Run output directory.
    pub output_dir: PathBuf,
    /// Workers that terminated abnormally.
    pub worker_errors: usize,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Target resource id.
    pub resource_id: u64,
    /// Pages reported by discovery.
    pub total_pages: u32,
    /// Pages scheduled.
    pub requested_pages: u32,
    /// Worker count.
    pub workers: usize,
    /// Run output directory.
    pub output_dir: PathBuf,
    /// Successful pages in page order.
    pub succeeded: Vec<PageSuccess>,
    /// Failed pages in page order.
    pub failed: Vec<PageFailure>,
    /// Workers that terminated abnormally.
    pub worker_errors: usize,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// Human-readable status line.
    pub status: String,
}

impl RunSummary {
    fn status_line(saved: usize, requested: u32, workers: usize, failed: usize) -> String {
        let mut status = format!("Saved {saved} of {requested} pages using {workers} workers.");
        if failed > 0 {
            status.push_str(&format!(" Failed to process {failed} pages."));
        }
        status
    }
}

/// Collects outcomes keyed by page number.
///
/// Shared by every worker; each page can be recorded once.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    outcomes: Mutex<BTreeMap<u32, FetchOutcome>>,
}

impl ResultAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `outcome`.
    ///
    /// Returns `false` and keeps the earlier outcome if the page was already
    /// recorded.
    pub fn record(&self, outcome: FetchOutcome) -> bool {
        let page = outcome.page();
        let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        if outcomes.contains_key(&page) {
            warn!(page, "duplicate outcome ignored");
            return false;
        }
        outcomes.insert(page, outcome);
        true
    }

    /// Number of pages recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds the summary for pages `1..=info.requested_pages`.
    ///
    /// Pages with no recorded outcome are reported as
    /// [`ErrorKind::Unprocessed`] failures with zero attempts. Outcomes
    /// outside the requested range are dropped.
    #[must_use]
    pub fn summarize(&self, info: RunInfo) -> RunSummary {
        let outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for page in 1..=info.requested_pages {
            match outcomes.get(&page) {
                Some(FetchOutcome::Success(success)) => succeeded.push(success.clone()),
                Some(FetchOutcome::Failure(failure)) => failed.push(failure.clone()),
                None => failed.push(PageFailure {
                    page,
                    kind: ErrorKind::Unprocessed,
                    message: unprocessed_reason(&info).to_string(),
                    attempts: 0,
                }),
            }
        }
        drop(outcomes);

        let status = RunSummary::status_line(
            succeeded.len(),
            info.requested_pages,
            info.workers,
            failed.len(),
        );

        RunSummary {
            resource_id: info.resource.get(),
            total_pages: info.total_pages,
            requested_pages: info.requested_pages,
            workers: info.workers,
            output_dir: info.output_dir,
            succeeded,
            failed,
            worker_errors: info.worker_errors,
            cancelled: info.cancelled,
            status,
        }
    }
}

fn unprocessed_reason(info: &RunInfo) -> &'static str {
    if info.cancelled {
        "run cancelled before page was processed"
    } else {
        "page was not processed"
    }
}
