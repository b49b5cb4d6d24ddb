//! End-to-end run orchestration.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::config::{ConfigError, HarvestConfig};
use super::planner::{PaginationPlanner, PlanningError};
use super::pool::{PageJob, WorkerPool};
use super::sink::{PersistenceError, PersistenceSink};
use super::summary::{RunInfo, RunSummary};
use crate::auth::{AuthError, TokenCache};
use crate::identifier::ResourceId;
use crate::upstream::PageSource;

/// A run that could not produce a summary.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Credentials could not be obtained.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Page count could not be discovered.
    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),

    /// The output directory could not be prepared.
    #[error("output setup failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl RunError {
    /// `true` for errors caused by the caller's input rather than the
    /// upstream or the environment.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Runs credential lookup, discovery and the worker pool for one resource.
pub struct Harvester {
    config: HarvestConfig,
    source: Arc<dyn PageSource>,
    tokens: Arc<TokenCache>,
}

impl Harvester {
    /// Creates a harvester after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Config`] if the configuration is out of range.
    pub fn new(
        config: HarvestConfig,
        source: Arc<dyn PageSource>,
        tokens: Arc<TokenCache>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            tokens,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Obtains credentials and discovers the page count of `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Auth`] or [`RunError::Planning`].
    #[instrument(skip(self, cancel), fields(resource_id = %resource))]
    pub async fn discover(
        &self,
        resource: ResourceId,
        cancel: &CancellationToken,
    ) -> Result<u32, RunError> {
        let tokens = self.tokens.get_valid_tokens().await?;
        let total_pages = self.planner().discover_total_pages(resource, &tokens, cancel).await?;
        Ok(total_pages)
    }

    /// Harvests every page of `resource` (up to the configured limit).
    ///
    /// Per-page failures never abort the run; they are reported in the
    /// summary. Cancellation stops the pool early and the summary lists the
    /// untouched pages as unprocessed.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] when credentials, discovery or output setup fail,
    /// before any page work starts.
    #[instrument(skip(self, cancel), fields(resource_id = %resource))]
    pub async fn run(
        &self,
        resource: ResourceId,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let tokens = self.tokens.get_valid_tokens().await?;
        let total_pages = self
            .planner()
            .discover_total_pages(resource, &tokens, cancel)
            .await?;
        let requested_pages = self.config.requested_pages(total_pages);

        let sink = PersistenceSink::prepare(&self.config.output_dir, resource)?;
        let output_dir = sink.dir().to_path_buf();
        info!(
            total_pages,
            requested_pages,
            workers = self.config.workers,
            output_dir = %output_dir.display(),
            "starting harvest"
        );

        let job = PageJob {
            resource,
            tokens: Arc::new(tokens),
            source: Arc::clone(&self.source),
            sink: Arc::new(sink),
        };
        let report = WorkerPool::new(&self.config)
            .run(job, requested_pages, cancel)
            .await;

        let summary = report.outcomes.summarize(RunInfo {
            resource,
            total_pages,
            requested_pages,
            workers: self.config.workers,
            output_dir,
            worker_errors: report.worker_errors,
            cancelled: report.cancelled,
        });
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "{}",
            summary.status
        );
        Ok(summary)
    }

    fn planner(&self) -> PaginationPlanner {
        PaginationPlanner::new(Arc::clone(&self.source), self.config.retry.clone())
    }
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("config", &self.config)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
