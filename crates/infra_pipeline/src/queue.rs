//! Task queue
//!
//! Unbounded FIFO shared by the ingestion side and the workers. Closing the
//! queue rejects further enqueues while workers keep draining what is
//! already queued; `dequeue` returns `None` once the queue is closed and
//! empty.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::error::PipelineError;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer multi-consumer queue with close semantics
#[derive(Debug)]
pub struct TaskQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Notify,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Notify::new(),
        }
    }

    /// Appends an item
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` once [`TaskQueue::close`] was called
    pub fn enqueue(&self, item: T) -> Result<(), PipelineError> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(PipelineError::QueueClosed);
            }
            state.items.push_back(item);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Takes the oldest item, waiting while the queue is open and empty
    pub async fn dequeue(&self) -> Option<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent enqueue cannot be missed
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Stops accepting items and wakes every waiting consumer
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_waiters();
    }

    /// Removes and returns everything still queued
    pub fn drain_remaining(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new();
        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert_eq!(queue.dequeue().await, Some(1));
        assert_eq!(queue.dequeue().await, Some(2));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_and_drains() {
        let queue = TaskQueue::new();
        queue.enqueue("a").unwrap();
        queue.close();

        assert!(matches!(queue.enqueue("b"), Err(PipelineError::QueueClosed)));
        assert_eq!(queue.dequeue().await, Some("a"));
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_waiting_consumer_woken_by_enqueue() {
        let queue = Arc::new(TaskQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(7).unwrap();
        assert_eq!(consumer.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_waiting_consumers_woken_by_close() {
        let queue: Arc<TaskQueue<u32>> = Arc::new(TaskQueue::new());
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        for consumer in consumers {
            let result = tokio::time::timeout(Duration::from_secs(1), consumer)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(result, None);
        }
    }

    #[test]
    fn test_drain_remaining_empties_queue() {
        let queue = TaskQueue::new();
        for i in 0..5 {
            queue.enqueue(i).unwrap();
        }
        assert_eq!(queue.drain_remaining(), vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }
}
