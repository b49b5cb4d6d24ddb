//! Bounded FIFO of page tasks with drain tracking.
//!
//! One producer puts page numbers in order followed by one
//! [`PageTask::Shutdown`] per worker. Workers take tasks through a shared
//! receiver; each dequeued task is acknowledged when its [`Dequeued`] guard
//! drops, so [`WorkQueue::join`] returns only once every item ever enqueued,
//! sentinels included, has been handled.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One unit of queued work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTask {
    /// Fetch this 1-based page number.
    Page(u32),
    /// Stop the worker that receives it.
    Shutdown,
}

/// Queue operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed.
    #[error("work queue closed")]
    Closed,
    /// The caller's cancellation token fired.
    #[error("work queue operation cancelled")]
    Cancelled,
}

/// Bounded multi-consumer task queue.
#[derive(Debug)]
pub struct WorkQueue {
    sender: mpsc::Sender<PageTask>,
    receiver: Mutex<mpsc::Receiver<PageTask>>,
    outstanding: AtomicUsize,
    drained: Notify,
}

/// A dequeued task; acknowledges it on drop.
#[derive(Debug)]
pub struct Dequeued<'a> {
    task: PageTask,
    queue: &'a WorkQueue,
}

impl Dequeued<'_> {
    /// The dequeued task.
    #[must_use]
    pub fn task(&self) -> PageTask {
        self.task
    }
}

impl Drop for Dequeued<'_> {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` pending tasks (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            outstanding: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Tasks enqueued but not yet acknowledged.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Enqueues `task`, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cancelled`] if `cancel` fires while waiting and
    /// [`QueueError::Closed`] if the queue was closed.
    pub async fn put(&self, task: PageTask, cancel: &CancellationToken) -> Result<(), QueueError> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let result = tokio::select! {
            sent = self.sender.send(task) => sent.map_err(|_| QueueError::Closed),
            () = cancel.cancelled() => Err(QueueError::Cancelled),
        };
        if result.is_err() {
            self.task_done();
        }
        result
    }

    /// Dequeues the next task, waiting while the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cancelled`] if `cancel` fires while waiting and
    /// [`QueueError::Closed`] once the queue is closed and empty.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<Dequeued<'_>, QueueError> {
        let mut receiver = tokio::select! {
            guard = self.receiver.lock() => guard,
            () = cancel.cancelled() => return Err(QueueError::Cancelled),
        };
        let task = tokio::select! {
            task = receiver.recv() => task.ok_or(QueueError::Closed)?,
            () = cancel.cancelled() => return Err(QueueError::Cancelled),
        };
        Ok(Dequeued { task, queue: self })
    }

    /// Closes the queue and acknowledges every task still pending.
    ///
    /// Returns the page numbers that were discarded.
    pub async fn close_and_drain(&self) -> Vec<u32> {
        let mut receiver = self.receiver.lock().await;
        receiver.close();

        let mut discarded = Vec::new();
        while let Ok(task) = receiver.try_recv() {
            if let PageTask::Page(page) = task {
                discarded.push(page);
            }
            self.task_done();
        }
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "discarded pending pages on close");
        }
        discarded
    }

    /// Waits until every enqueued task has been acknowledged.
    pub async fn join(&self) {
        loop {
            let drained = self.drained.notified();
            if self.outstanding() == 0 {
                return;
            }
            drained.await;
        }
    }

    fn task_done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_fifo_order_and_acknowledgement() {
        let queue = WorkQueue::new(4);
        let cancel = CancellationToken::new();
        queue.put(PageTask::Page(1), &cancel).await.unwrap();
        queue.put(PageTask::Page(2), &cancel).await.unwrap();
        queue.put(PageTask::Shutdown, &cancel).await.unwrap();
        assert_eq!(queue.outstanding(), 3);

        let first = queue.get(&cancel).await.unwrap();
        assert_eq!(first.task(), PageTask::Page(1));
        assert_eq!(queue.outstanding(), 3);
        drop(first);
        assert_eq!(queue.outstanding(), 2);

        assert_eq!(queue.get(&cancel).await.unwrap().task(), PageTask::Page(2));
        assert_eq!(queue.get(&cancel).await.unwrap().task(), PageTask::Shutdown);
        assert_eq!(queue.outstanding(), 0);
        queue.join().await;
    }

    #[tokio::test]
    async fn test_put_blocks_when_full_until_cancelled() {
        let queue = WorkQueue::new(1);
        let cancel = CancellationToken::new();
        queue.put(PageTask::Page(1), &cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        assert_eq!(
            queue.put(PageTask::Page(2), &cancel).await,
            Err(QueueError::Cancelled)
        );
        assert_eq!(queue.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_get_on_empty_queue_is_cancellable() {
        let queue = WorkQueue::new(2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            queue.get(&cancel).await,
            Err(QueueError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_close_and_drain_acknowledges_pending() {
        let queue = WorkQueue::new(4);
        let cancel = CancellationToken::new();
        queue.put(PageTask::Page(7), &cancel).await.unwrap();
        queue.put(PageTask::Page(8), &cancel).await.unwrap();
        queue.put(PageTask::Shutdown, &cancel).await.unwrap();

        let discarded = queue.close_and_drain().await;

        assert_eq!(discarded, vec![7, 8]);
        assert_eq!(queue.outstanding(), 0);
        queue.join().await;
        assert!(matches!(
            queue.get(&cancel).await,
            Err(QueueError::Closed)
        ));
        assert_eq!(
            queue.put(PageTask::Page(9), &cancel).await,
            Err(QueueError::Closed)
        );
    }

    #[tokio::test]
    async fn test_join_waits_for_consumers() {
        let queue = Arc::new(WorkQueue::new(8));
        let cancel = CancellationToken::new();
        for page in 1..=5 {
            queue.put(PageTask::Page(page), &cancel).await.unwrap();
        }

        let consumer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for _ in 0..5 {
                    let item = queue.get(&cancel).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    drop(item);
                }
            })
        };

        tokio::time::timeout(Duration::from_secs(5), queue.join())
            .await
            .unwrap();
        assert_eq!(queue.outstanding(), 0);
        consumer.await.unwrap();
    }
}
