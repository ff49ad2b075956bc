use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

/// What the per-item sender did with a drained request
#[derive(Debug)]
pub enum DrainStep<T> {
    /// Succeeded or failed terminally; the item is gone for good
    Resolved,
    /// Retryable failure; the item goes back to the head of the queue
    Retry(T),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub resolved: usize,
    pub halted: bool,
}

/// FIFO of requests waiting for service to come back.
///
/// `enqueue` may run while a drain is in flight. The sequence lock is only
/// held for the push or pop itself, never across the sender's await.
pub struct RequestQueue<T> {
    items: Mutex<VecDeque<T>>,
    draining: tokio::sync::Mutex<()>,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            draining: tokio::sync::Mutex::new(()),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        // A panic while holding the lock cannot leave the deque half-mutated
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, item: T) {
        self.items().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Feed queued items to `dispatch` head first until the queue is empty
    /// or an item asks to be retried. Only one drain runs at a time.
    pub async fn drain<F, Fut>(&self, mut dispatch: F) -> DrainReport
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = DrainStep<T>>,
    {
        let _draining = self.draining.lock().await;
        let mut report = DrainReport::default();

        loop {
            let next = self.items().pop_front();
            let Some(item) = next else {
                break;
            };

            match dispatch(item).await {
                DrainStep::Resolved => report.resolved += 1,
                DrainStep::Retry(item) => {
                    self.items().push_front(item);
                    report.halted = true;
                    break;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_preserves_fifo_order() {
        let queue = RequestQueue::new();
        for n in 1..=5 {
            queue.enqueue(n);
        }

        let mut seen = Vec::new();
        let report = queue
            .drain(|n| {
                seen.push(n);
                async { DrainStep::Resolved }
            })
            .await;

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(report.resolved, 5);
        assert!(!report.halted);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_empty_drain_never_calls_sender() {
        let queue: RequestQueue<u32> = RequestQueue::new();
        let mut calls = 0;
        let report = queue
            .drain(|_| {
                calls += 1;
                async { DrainStep::Resolved }
            })
            .await;
        assert_eq!(calls, 0);
        assert_eq!(report, DrainReport::default());
    }

    #[tokio::test]
    async fn test_retry_returns_item_to_head_and_stops() {
        let queue = RequestQueue::new();
        for n in 1..=4 {
            queue.enqueue(n);
        }

        let mut seen = Vec::new();
        let report = queue
            .drain(|n| {
                seen.push(n);
                async move {
                    if n == 2 {
                        DrainStep::Retry(n)
                    } else {
                        DrainStep::Resolved
                    }
                }
            })
            .await;

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(report.resolved, 1);
        assert!(report.halted);
        assert_eq!(queue.len(), 3);

        // Next pass resumes with the retried item first
        let mut second = Vec::new();
        queue
            .drain(|n| {
                second.push(n);
                async { DrainStep::Resolved }
            })
            .await;
        assert_eq!(second, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_enqueue_during_drain_is_picked_up() {
        let queue = Arc::new(RequestQueue::new());
        queue.enqueue(1);

        let mut seen = Vec::new();
        let producer = Arc::clone(&queue);
        queue
            .drain(|n| {
                seen.push(n);
                if n == 1 {
                    producer.enqueue(2);
                }
                async { DrainStep::Resolved }
            })
            .await;

        assert_eq!(seen, vec![1, 2]);
        assert!(queue.is_empty());
    }
}
