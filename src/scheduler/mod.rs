//! Bounded worker pool for migration jobs.
//!
//! This module provides the in-process dispatch machinery:
//!
//! - **JobSource**: lazily reads jobs from the account list
//! - **JobQueue**: bounded FIFO between the producer and the workers
//! - **CompletionTracker**: wait group counting queued and in-flight jobs
//! - **WorkerPool**: fixed set of workers draining the queue
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  JobSource   │──── register() ───► CompletionTracker
//!                      └──────┬───────┘                           ▲
//!                             │ enqueue (blocks when full)        │
//!                      ┌──────▼───────┐                           │
//!                      │   JobQueue   │                           │
//!                      │ (capacity N) │                           │
//!                      └──────┬───────┘                           │
//!         ┌───────────────────┼───────────────────┐               │
//!         ▼                   ▼                   ▼               │
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐          │
//!    │ Worker 1│         │ Worker 2│         │ Worker N│ ── done ─┘
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! # Guarantees
//!
//! - **Exactly once**: every dequeued job is processed by one worker
//! - **Bounded**: at most N jobs run concurrently
//! - **Isolated**: a failing job is logged and reported, other jobs carry on

pub mod job;
pub mod queue;
pub mod source;
pub mod tracker;
pub mod worker_pool;

// Re-export main types for convenience
pub use job::{Credentials, Job, JobResult, JobStatus};
pub use queue::{JobQueue, QueueError};
pub use source::{parse_line, JobSource, ParsedLine};
pub use tracker::{Completion, CompletionTracker};
pub use worker_pool::{Dispatched, PoolError, PoolStats, Worker, WorkerPool, WorkerPoolConfig};
