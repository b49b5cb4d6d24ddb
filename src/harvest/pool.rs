//! Worker pool draining the page queue.
//!
//! One producer task fills the bounded [`WorkQueue`] with pages `1..=pages`
//! followed by one [`PageTask::Shutdown`] per worker. Each worker loops:
//!
//! 1. wait at the [`CooldownGate`]
//! 2. dequeue; a shutdown marker ends the loop
//! 3. fetch and persist the page under the [`RetryPolicy`]
//! 4. record the outcome and report the completion to the gate
//! 5. sleep the per-task jitter, plus the batch delay every `batch_size` tasks
//!
//! A worker that fails or panics outside the retry-wrapped fetch stops alone;
//! its siblings keep draining. The pool returns only after the producer has
//! finished, every worker has been collected and every queued item has been
//! acknowledged.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use super::config::{DelayRange, HarvestConfig};
use super::gate::CooldownGate;
use super::queue::{PageTask, QueueError, WorkQueue};
use super::retry::{AttemptError, RetryPolicy};
use super::sink::PersistenceSink;
use super::summary::{FetchOutcome, ResultAggregator};
use crate::auth::TokenRecord;
use crate::identifier::ResourceId;
use crate::upstream::PageSource;

/// Inputs a run hands to every worker.
#[derive(Clone)]
pub struct PageJob {
    /// Target resource.
    pub resource: ResourceId,
    /// Credentials attached to every fetch.
    pub tokens: Arc<TokenRecord>,
    /// Page fetcher.
    pub source: Arc<dyn PageSource>,
    /// Output writer.
    pub sink: Arc<PersistenceSink>,
}

impl std::fmt::Debug for PageJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageJob")
            .field("resource", &self.resource)
            .field("tokens", &self.tokens)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

/// What the pool observed while draining.
#[derive(Debug)]
pub struct PoolReport {
    /// Recorded outcomes.
    pub outcomes: Arc<ResultAggregator>,
    /// Workers that returned an error or panicked.
    pub worker_errors: usize,
    /// Whether the caller's token fired.
    pub cancelled: bool,
    /// Global cooldowns performed.
    pub cooldowns: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pacing {
    task_jitter: DelayRange,
    batch_size: u32,
    batch_delay: DelayRange,
}

struct WorkerContext {
    job: PageJob,
    retry: RetryPolicy,
    pacing: Pacing,
    gate: Arc<CooldownGate>,
    queue: Arc<WorkQueue>,
    outcomes: Arc<ResultAggregator>,
}

/// Fixed-size pool of page workers for one run.
#[derive(Debug)]
pub struct WorkerPool {
    workers: usize,
    retry: RetryPolicy,
    pacing: Pacing,
    gate: Arc<CooldownGate>,
    queue: Arc<WorkQueue>,
}

impl WorkerPool {
    /// Creates a pool with fresh gate and queue state from `config`.
    ///
    /// The worker count is expected to be validated already; it is raised to
    /// 1 if zero.
    #[must_use]
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            retry: config.retry.clone(),
            pacing: Pacing {
                task_jitter: config.task_jitter,
                batch_size: config.batch_size.max(1),
                batch_delay: config.batch_delay,
            },
            gate: Arc::new(CooldownGate::new(config.cooldown_every, config.cooldown)),
            queue: Arc::new(WorkQueue::new(config.queue_capacity())),
        }
    }

    /// Processes pages `1..=pages` and returns once the pool is fully drained.
    ///
    /// Cancelling `cancel` unblocks every waiting worker and the producer;
    /// pages that were never dequeued are left unrecorded.
    #[instrument(skip(self, job, cancel), fields(resource_id = %job.resource, workers = self.workers))]
    pub async fn run(self, job: PageJob, pages: u32, cancel: &CancellationToken) -> PoolReport {
        let outcomes = Arc::new(ResultAggregator::new());
        let producer_cancel = cancel.child_token();

        let producer = tokio::spawn(produce(
            Arc::clone(&self.queue),
            pages,
            self.workers,
            producer_cancel.clone(),
        ));

        let context = Arc::new(WorkerContext {
            job,
            retry: self.retry.clone(),
            pacing: self.pacing,
            gate: Arc::clone(&self.gate),
            queue: Arc::clone(&self.queue),
            outcomes: Arc::clone(&outcomes),
        });

        let handles: Vec<JoinHandle<Result<u32, QueueError>>> = (0..self.workers)
            .map(|worker_id| {
                let context = Arc::clone(&context);
                let cancel = cancel.clone();
                tokio::spawn(
                    run_worker(context, cancel).instrument(info_span!("worker", worker_id)),
                )
            })
            .collect();

        let mut worker_errors = 0;
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(processed)) => debug!(worker_id, processed, "worker finished"),
                Ok(Err(error)) => {
                    warn!(worker_id, error = %error, "worker stopped with an error");
                    worker_errors += 1;
                }
                Err(join_error) => {
                    warn!(worker_id, error = %join_error, "worker terminated abnormally");
                    worker_errors += 1;
                }
            }
        }

        // No consumer is left; a producer blocked on a full queue must not hang.
        producer_cancel.cancel();
        match producer.await {
            Ok(Ok(())) => debug!("producer finished"),
            Ok(Err(error)) => debug!(error = %error, "producer stopped early"),
            Err(join_error) => warn!(error = %join_error, "producer terminated abnormally"),
        }

        let discarded = self.queue.close_and_drain().await;
        self.queue.join().await;

        let report = PoolReport {
            outcomes,
            worker_errors,
            cancelled: cancel.is_cancelled(),
            cooldowns: self.gate.cooldowns(),
        };
        info!(
            recorded = report.outcomes.len(),
            discarded = discarded.len(),
            worker_errors = report.worker_errors,
            cooldowns = report.cooldowns,
            cancelled = report.cancelled,
            "worker pool drained"
        );
        report
    }
}

async fn produce(
    queue: Arc<WorkQueue>,
    pages: u32,
    workers: usize,
    cancel: CancellationToken,
) -> Result<(), QueueError> {
    for page in 1..=pages {
        queue.put(PageTask::Page(page), &cancel).await?;
    }
    for _ in 0..workers {
        queue.put(PageTask::Shutdown, &cancel).await?;
    }
    debug!(pages, markers = workers, "all tasks enqueued");
    Ok(())
}

async fn run_worker(context: Arc<WorkerContext>, cancel: CancellationToken) -> Result<u32, QueueError> {
    let mut processed = 0u32;

    loop {
        if !context.gate.wait(&cancel).await {
            debug!("cancelled at gate");
            break;
        }

        let item = match context.queue.get(&cancel).await {
            Ok(item) => item,
            Err(QueueError::Cancelled) => {
                debug!("cancelled while waiting for work");
                break;
            }
            Err(error) => return Err(error),
        };
        let PageTask::Page(page) = item.task() else {
            debug!("shutdown marker received");
            break;
        };

        let outcome = fetch_and_store(&context, page, &cancel).await;
        context.outcomes.record(outcome);
        drop(item);
        processed += 1;

        context.gate.on_task_completed(&cancel).await;

        if !pause(context.pacing.task_jitter.sample(), &cancel).await {
            break;
        }
        if processed % context.pacing.batch_size == 0 {
            let delay = context.pacing.batch_delay.sample();
            debug!(processed, delay_ms = delay.as_millis(), "batch delay");
            if !pause(delay, &cancel).await {
                break;
            }
        }
    }

    Ok(processed)
}

async fn fetch_and_store(
    context: &WorkerContext,
    page: u32,
    cancel: &CancellationToken,
) -> FetchOutcome {
    let job = &context.job;
    let result = context
        .retry
        .with_retry(cancel, |attempt| async move {
            debug!(page, attempt, "fetching page");
            let payload = job.source.fetch_page(job.resource, page, &job.tokens).await?;
            let path = job.sink.write(page, &payload).await?;
            Ok::<_, AttemptError>(path)
        })
        .await;

    match result {
        Ok((path, attempts)) => {
            debug!(page, attempts, "page done");
            FetchOutcome::success(page, path, attempts)
        }
        Err(exhausted) => {
            let kind = exhausted.error.kind();
            warn!(
                page,
                attempts = exhausted.attempts,
                kind = %kind,
                error = %exhausted.error,
                "page failed"
            );
            FetchOutcome::failure(page, kind, &exhausted.error, exhausted.attempts)
        }
    }
}

/// Sleeps for `duration` unless cancelled. Returns `false` on cancellation.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::harvest::retry::ErrorKind;
    use crate::harvest::summary::{RunInfo, RunSummary};
    use crate::upstream::UpstreamError;

    /// Serves `[{"page":N}]`, or a scripted status a fixed number of times.
    #[derive(Default)]
    struct FakeSource {
        failures: Mutex<HashMap<u32, (u16, u32)>>,
        calls: AtomicU32,
        panic_on: Option<u32>,
    }

    impl FakeSource {
        fn failing(page: u32, status: u16, times: u32) -> Self {
            let source = Self::default();
            source.failures.lock().unwrap().insert(page, (status, times));
            source
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn fetch_page(
            &self,
            _resource: ResourceId,
            page: u32,
            _tokens: &TokenRecord,
        ) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(self.panic_on != Some(page), "simulated worker crash on page {page}");
            let mut failures = self.failures.lock().unwrap();
            if let Some((status, remaining)) = failures.get_mut(&page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(UpstreamError::http_status("http://fake.test/graph", *status));
                }
            }
            Ok(format!(r#"[{{"page":{page}}}]"#))
        }
    }

    fn fast_config(workers: usize) -> HarvestConfig {
        HarvestConfig {
            workers,
            retry: RetryPolicy::new(
                4,
                Duration::from_millis(1),
                Duration::from_millis(1),
                Duration::from_millis(5),
            )
            .with_jitter(Duration::ZERO),
            cooldown_every: 10,
            cooldown: DelayRange::from_millis(1, 2),
            task_jitter: DelayRange::zero(),
            batch_size: 3,
            batch_delay: DelayRange::from_millis(0, 1),
            ..HarvestConfig::default()
        }
    }

    fn job(root: &TempDir, source: Arc<dyn PageSource>) -> PageJob {
        let resource = ResourceId::new(11);
        PageJob {
            resource,
            tokens: Arc::new(TokenRecord::new("csrf", "c=1", 1)),
            source,
            sink: Arc::new(PersistenceSink::prepare(root.path(), resource).unwrap()),
        }
    }

    fn summarize(report: &PoolReport, pages: u32, workers: usize) -> RunSummary {
        report.outcomes.summarize(RunInfo {
            resource: ResourceId::new(11),
            total_pages: pages,
            requested_pages: pages,
            workers,
            output_dir: PathBuf::new(),
            worker_errors: report.worker_errors,
            cancelled: report.cancelled,
        })
    }

    // ==================== Accounting ====================

    #[tokio::test]
    async fn test_every_page_recorded_once() {
        for (pages, workers) in [(0, 1), (1, 1), (7, 3), (23, 5), (40, 12)] {
            let root = TempDir::new().unwrap();
            let source = Arc::new(FakeSource::default());
            let pool = WorkerPool::new(&fast_config(workers));

            let report = pool
                .run(job(&root, Arc::clone(&source) as Arc<dyn PageSource>), pages, &CancellationToken::new())
                .await;
            let summary = summarize(&report, pages, workers);

            assert_eq!(summary.succeeded.len(), pages as usize, "pages={pages}");
            assert!(summary.failed.is_empty());
            assert_eq!(source.calls.load(Ordering::SeqCst), pages);
            assert_eq!(report.worker_errors, 0);
        }
    }

    #[tokio::test]
    async fn test_transient_then_success_counts_attempts() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::failing(4, 503, 2));
        let report = WorkerPool::new(&fast_config(3))
            .run(job(&root, source), 9, &CancellationToken::new())
            .await;
        let summary = summarize(&report, 9, 3);

        assert_eq!(summary.succeeded.len(), 9);
        let page4 = summary.succeeded.iter().find(|s| s.page == 4).unwrap();
        assert_eq!(page4.attempts, 3);
        assert!(summary
            .succeeded
            .iter()
            .filter(|s| s.page != 4)
            .all(|s| s.attempts == 1));
    }

    #[tokio::test]
    async fn test_retry_ceiling_recorded_as_failure() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::failing(2, 429, 10));
        let report = WorkerPool::new(&fast_config(2))
            .run(job(&root, source), 5, &CancellationToken::new())
            .await;
        let summary = summarize(&report, 5, 2);

        assert_eq!(summary.succeeded.len(), 4);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].page, 2);
        assert_eq!(summary.failed[0].kind, ErrorKind::RateLimited);
        assert_eq!(summary.failed[0].attempts, 4);
    }

    #[tokio::test]
    async fn test_fatal_error_isolated_to_page() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::failing(3, 404, 1));
        let report = WorkerPool::new(&fast_config(4))
            .run(job(&root, source), 6, &CancellationToken::new())
            .await;
        let summary = summarize(&report, 6, 4);

        assert_eq!(summary.succeeded.len(), 5);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].page, 3);
        assert_eq!(summary.failed[0].kind, ErrorKind::HttpStatus);
        assert_eq!(summary.failed[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_write_failure_isolated_to_page() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::default());
        let job = job(&root, Arc::clone(&source) as Arc<dyn PageSource>);
        // A directory in place of pg4.json makes the final rename fail.
        let blocker = job.sink.page_path(4);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();

        let report = WorkerPool::new(&fast_config(3))
            .run(job, 8, &CancellationToken::new())
            .await;
        let summary = summarize(&report, 8, 3);

        assert_eq!(summary.succeeded.len(), 7);
        assert!(summary.succeeded.iter().all(|success| success.page != 4));
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].page, 4);
        assert_eq!(summary.failed[0].kind, ErrorKind::Persistence);
        assert_eq!(summary.failed[0].attempts, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 8);
        assert_eq!(report.worker_errors, 0);
    }

    // ==================== Pacing ====================

    #[tokio::test]
    async fn test_cooldowns_follow_completed_count() {
        let root = TempDir::new().unwrap();
        let report = WorkerPool::new(&fast_config(4))
            .run(
                job(&root, Arc::new(FakeSource::default())),
                35,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(report.cooldowns, 3);
    }

    // ==================== Failure Isolation ====================

    #[tokio::test]
    async fn test_crashed_worker_does_not_stop_siblings() {
        let root = TempDir::new().unwrap();
        let source = Arc::new(FakeSource {
            panic_on: Some(5),
            ..FakeSource::default()
        });
        let report = WorkerPool::new(&fast_config(3))
            .run(job(&root, source), 12, &CancellationToken::new())
            .await;
        let summary = summarize(&report, 12, 3);

        assert_eq!(report.worker_errors, 1);
        assert_eq!(summary.succeeded.len(), 11);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].page, 5);
        assert_eq!(summary.failed[0].kind, ErrorKind::Unprocessed);
    }

    // ==================== Cancellation ====================

    #[tokio::test]
    async fn test_cancellation_unblocks_pool() {
        let root = TempDir::new().unwrap();
        let mut config = fast_config(2);
        config.task_jitter = DelayRange::from_millis(60_000, 60_000);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            WorkerPool::new(&config).run(job(&root, Arc::new(FakeSource::default())), 50, &cancel),
        )
        .await
        .unwrap();
        let summary = summarize(&report, 50, 2);

        assert!(report.cancelled);
        assert_eq!(summary.succeeded.len() + summary.failed.len(), 50);
        assert!(summary.succeeded.len() <= 2);
        assert!(summary
            .failed
            .iter()
            .all(|failure| failure.kind == ErrorKind::Unprocessed));
    }
}
