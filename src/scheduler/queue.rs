//! Bounded in-process job queue.
//!
//! A fixed-capacity FIFO between the single producer and the worker pool.
//!
//! - `enqueue` waits while the queue is full, giving backpressure on the producer
//! - `dequeue` waits until an item is available, or returns `None` once the
//!   queue is closed and drained
//! - `close` stops further enqueues; items already queued are still delivered
//!
//! Closing before every intended item has been enqueued drops the remainder
//! at the producer. Nothing checks for this at runtime.

use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// Errors that can occur during queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed before the item could be enqueued.
    #[error("Queue is closed")]
    Closed,

    /// Capacity must be at least one.
    #[error("Invalid queue capacity: {0}")]
    InvalidCapacity(usize),
}

/// Bounded multi-consumer FIFO queue.
///
/// Shared between the producer and all workers behind an `Arc`.
pub struct JobQueue<T> {
    /// Sending half; taken out on close.
    sender: Mutex<Option<mpsc::Sender<T>>>,
    /// Receiving half, shared by all consumers.
    receiver: AsyncMutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T: Send> JobQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidCapacity` if `capacity` is zero.
    pub fn bounded(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity(capacity));
        }

        let (sender, receiver) = mpsc::channel(capacity);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            capacity,
        })
    }

    /// Enqueues an item, waiting for a free slot if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` if the queue was closed.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let sender = self.sender_handle().ok_or(QueueError::Closed)?;
        sender.send(item).await.map_err(|_| QueueError::Closed)
    }

    /// Dequeues the next item in FIFO order.
    ///
    /// Returns `None` once the queue is closed and every queued item has
    /// been handed out.
    pub async fn dequeue(&self) -> Option<T> {
        // Holding the receiver lock across the wait keeps waiting consumers
        // in line behind one another.
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Closes the queue. Subsequent enqueues fail; queued items remain.
    ///
    /// Calling this more than once has no further effect.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// Returns whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.sender_handle().is_none()
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of items currently queued.
    pub fn len(&self) -> usize {
        match self.sender_handle() {
            Some(sender) => self.capacity - sender.capacity(),
            None => 0,
        }
    }

    /// Returns whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sender_handle(&self) -> Option<mpsc::Sender<T>> {
        self.sender.lock().ok().and_then(|sender| sender.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_queue_error_display() {
        assert!(QueueError::Closed.to_string().contains("closed"));
        assert!(QueueError::InvalidCapacity(0).to_string().contains('0'));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            JobQueue::<u32>::bounded(0).err(),
            Some(QueueError::InvalidCapacity(0))
        );
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::bounded(4).expect("queue");
        for i in 0..4 {
            queue.enqueue(i).await.expect("enqueue");
        }
        assert_eq!(queue.len(), 4);

        for i in 0..4 {
            assert_eq!(queue.dequeue().await, Some(i));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_before_none() {
        let queue = JobQueue::bounded(2).expect("queue");
        queue.enqueue("a").await.expect("enqueue");
        queue.enqueue("b").await.expect("enqueue");
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.enqueue("c").await, Err(QueueError::Closed));
        assert_eq!(queue.dequeue().await, Some("a"));
        assert_eq!(queue.dequeue().await, Some("b"));
        assert_eq!(queue.dequeue().await, None);
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_enqueue_blocks_when_full() {
        let queue = Arc::new(JobQueue::bounded(1).expect("queue"));
        queue.enqueue(1).await.expect("enqueue");

        let blocked = tokio::time::timeout(Duration::from_millis(50), queue.enqueue(2)).await;
        assert!(blocked.is_err(), "enqueue should wait for a free slot");

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(3).await })
        };

        assert_eq!(queue.dequeue().await, Some(1));
        producer.await.expect("join").expect("enqueue");
        assert_eq!(queue.dequeue().await, Some(3));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_close() {
        let queue = Arc::new(JobQueue::<u32>::bounded(1).expect("queue"));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should observe close")
            .expect("join");
        assert_eq!(result, None);
    }
}
