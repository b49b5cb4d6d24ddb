//! Page-count discovery.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::retry::{AttemptError, RetryExhausted, RetryPolicy};
use crate::auth::TokenRecord;
use crate::identifier::ResourceId;
use crate::upstream::{PageSource, ParseError, parse_page_count};

/// Page count could not be discovered.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    /// The discovery request failed.
    #[error("page count request failed: {0}")]
    Request(#[source] RetryExhausted),

    /// The response did not carry a page count.
    #[error("page count unavailable: {0}")]
    Parse(#[from] ParseError),
}

/// Learns how many pages a resource has.
pub struct PaginationPlanner {
    source: Arc<dyn PageSource>,
    retry: RetryPolicy,
}

impl PaginationPlanner {
    /// Creates a planner using `source` for the discovery call.
    #[must_use]
    pub fn new(source: Arc<dyn PageSource>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Fetches page 1 and reads the page count from it.
    ///
    /// Retryable failures are retried under the run's policy.
    ///
    /// # Errors
    ///
    /// Returns [`PlanningError::Request`] when the request fails fatally or
    /// exhausts its retries, and [`PlanningError::Parse`] when the count is
    /// absent or invalid.
    #[instrument(skip(self, tokens, cancel), fields(resource_id = %resource))]
    pub async fn discover_total_pages(
        &self,
        resource: ResourceId,
        tokens: &TokenRecord,
        cancel: &CancellationToken,
    ) -> Result<u32, PlanningError> {
        let source = self.source.as_ref();
        let (body, attempts) = self
            .retry
            .with_retry(cancel, |_| async move {
                source
                    .fetch_page(resource, 1, tokens)
                    .await
                    .map_err(AttemptError::from)
            })
            .await
            .map_err(PlanningError::Request)?;

        let total_pages = parse_page_count(&body)?;
        info!(total_pages, attempts, "discovered page count");
        Ok(total_pages)
    }
}

impl std::fmt::Debug for PaginationPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginationPlanner")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
