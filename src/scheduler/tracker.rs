//! Completion tracking for dispatched jobs.
//!
//! Works like a wait group: the producer registers each job before it is
//! queued and receives a [`Completion`] guard that travels with the job.
//! Dropping the guard marks the job done, so each registration is released
//! exactly once, including when the processing task panics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TrackerState {
    pending: AtomicUsize,
    registered: AtomicU64,
    completed: AtomicU64,
    drained: Notify,
}

/// Counts jobs that are queued or in flight.
#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    state: Arc<TrackerState>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one pending job. Must happen before the job is queued.
    pub fn register(&self) -> Completion {
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        self.state.registered.fetch_add(1, Ordering::SeqCst);
        Completion {
            state: Arc::clone(&self.state),
        }
    }

    /// Waits until every registered job has completed.
    ///
    /// Returns immediately if nothing is pending. Registrations racing with
    /// this call are only covered if they happen before the count first
    /// reaches zero, so the producer finishes registering before waiting.
    pub async fn wait(&self) {
        loop {
            // Create the waiter before checking so a release in between is not missed.
            let drained = self.state.drained.notified();
            if self.state.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Number of jobs registered but not yet completed.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Total number of registrations.
    pub fn registered(&self) -> u64 {
        self.state.registered.load(Ordering::SeqCst)
    }

    /// Total number of completions.
    pub fn completed(&self) -> u64 {
        self.state.completed.load(Ordering::SeqCst)
    }
}

/// Proof that a job was registered. Dropping it marks the job complete.
#[derive(Debug)]
#[must_use = "dropping a Completion marks its job as done"]
pub struct Completion {
    state: Arc<TrackerState>,
}

impl Completion {
    /// Marks the job complete. Same as dropping the guard.
    pub fn done(self) {}
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.state.completed.fetch_add(1, Ordering::SeqCst);
        if self.state.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.drained.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let tracker = CompletionTracker::new();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait())
            .await
            .expect("idle tracker should not block");
    }

    #[test]
    fn test_register_and_done() {
        let tracker = CompletionTracker::new();
        let a = tracker.register();
        let b = tracker.register();
        assert_eq!(tracker.pending(), 2);

        a.done();
        assert_eq!(tracker.pending(), 1);
        drop(b);

        assert_eq!(tracker.pending(), 0);
        assert_eq!(tracker.registered(), 2);
        assert_eq!(tracker.completed(), 2);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_last_completion() {
        let tracker = CompletionTracker::new();
        let first = tracker.register();
        let second = tracker.register();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait().await })
        };

        first.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        second.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("join");
    }

    #[tokio::test]
    async fn test_completion_released_on_panic() {
        let tracker = CompletionTracker::new();
        let completion = tracker.register();

        let handle = tokio::spawn(async move {
            let _completion = completion;
            panic!("job processing blew up");
        });
        assert!(handle.await.is_err());

        assert_eq!(tracker.pending(), 0);
        tracker.wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_completions() {
        let tracker = CompletionTracker::new();
        let mut handles = Vec::new();

        for i in 0..500u64 {
            let completion = tracker.register();
            handles.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(i % 7)).await;
                completion.done();
            }));
        }

        tokio::time::timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("all completions should arrive");
        assert_eq!(tracker.registered(), 500);
        assert_eq!(tracker.completed(), 500);

        for handle in handles {
            handle.await.expect("join");
        }
    }
}
