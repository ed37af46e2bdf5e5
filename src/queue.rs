//! Unbounded FIFO shared between the client facade and its consumers.
//!
//! Producers push synchronously and never block. Consumers pop with a
//! timeout, and acknowledge processed items with [`MessageQueue::task_done`]
//! so that [`MessageQueue::join`] can report when everything pushed has been
//! handled.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    /// Items pushed but not yet acknowledged
    unfinished: usize,
}

/// Thread-safe unbounded queue with drain tracking.
#[derive(Debug)]
pub struct MessageQueue<T> {
    state: Mutex<State<T>>,
    available: Notify,
    drained: Notify,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                unfinished: 0,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Critical sections never panic midway, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item to the back of the queue.
    pub fn push(&self, item: T) {
        {
            let mut state = self.lock();
            state.items.push_back(item);
            state.unfinished += 1;
        }
        self.available.notify_one();
    }

    /// Return a popped, not yet acknowledged item to the head of the queue.
    pub fn push_front(&self, item: T) {
        self.lock().items.push_front(item);
        self.available.notify_one();
    }

    /// Pop the next item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Pop the next item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` once the timeout elapses with the queue still empty.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the await is not missed
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Acknowledge `count` popped items as fully processed.
    pub fn task_done(&self, count: usize) {
        let drained = {
            let mut state = self.lock();
            state.unfinished = state.unfinished.saturating_sub(count);
            state.unfinished == 0
        };

        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Wait until every pushed item has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }

            notified.await;
        }
    }

    /// Number of items waiting to be popped.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Number of items pushed but not yet acknowledged, including in-flight ones.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_push_pop_preserves_order() {
        let queue = MessageQueue::new();
        for i in 0..5 {
            queue.push(i);
        }

        for i in 0..5 {
            assert_eq!(queue.try_pop(), Some(i));
        }
        assert!(queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn test_pop_timeout_returns_none_when_empty() {
        let queue: MessageQueue<u32> = MessageQueue::new();
        let started = Instant::now();

        let item = queue.pop_timeout(Duration::from_millis(50)).await;

        assert!(item.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(MessageQueue::new());
        let producer = queue.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push("hello");
        });

        let item = timeout(Duration::from_secs(1), queue.pop_timeout(Duration::from_secs(5)))
            .await
            .expect("Should wake before the outer timeout");
        assert_eq!(item, Some("hello"));
    }

    #[tokio::test]
    async fn test_push_front_goes_to_head() {
        let queue = MessageQueue::new();
        queue.push(2);
        queue.push(3);

        let first = queue.try_pop().unwrap();
        queue.push_front(1);
        queue.push_front(first);

        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(3));
        // push_front does not count as a new item
        assert_eq!(queue.unfinished(), 2);
    }

    #[tokio::test]
    async fn test_join_returns_immediately_when_empty() {
        let queue: MessageQueue<u32> = MessageQueue::new();
        timeout(Duration::from_millis(100), queue.join())
            .await
            .expect("join on an empty queue should not wait");
    }

    #[tokio::test]
    async fn test_join_waits_for_task_done() {
        let queue = Arc::new(MessageQueue::new());
        queue.push(1);
        queue.push(2);

        let worker = queue.clone();
        tokio::spawn(async move {
            let mut popped = 0;
            while worker.try_pop().is_some() {
                popped += 1;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            worker.task_done(popped);
        });

        timeout(Duration::from_secs(1), queue.join())
            .await
            .expect("join should finish after task_done");
        assert_eq!(queue.unfinished(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_join_pending_while_items_unacknowledged() {
        let queue = MessageQueue::new();
        queue.push(1);
        let _ = queue.try_pop();

        let result = timeout(Duration::from_millis(50), queue.join()).await;
        assert!(result.is_err(), "popped but unacknowledged items keep join pending");
    }

    #[tokio::test]
    async fn test_task_done_saturates() {
        let queue: MessageQueue<u32> = MessageQueue::new();
        queue.task_done(3);
        assert_eq!(queue.unfinished(), 0);
    }
}
