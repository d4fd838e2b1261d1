//! Worker pool for processing migration jobs.
//!
//! This module provides a fixed pool of workers that drain a shared bounded
//! queue. Each worker runs as an independent async task and pulls jobs until
//! the queue is closed and empty.
//!
//! # Features
//!
//! - Configurable number of workers, fixed for the lifetime of the pool
//! - Optional per-job deadline
//! - Failures are written to the failure log and never stop other workers
//! - Pool statistics tracking, including peak concurrency

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::MigrationError;
use crate::events::{EventSink, RunEvent};
use crate::failure_log::FailureLog;
use crate::migration::{MigrationRequest, Migrator};

use super::job::{Job, JobResult, JobStatus};
use super::queue::JobQueue;
use super::tracker::Completion;

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// One or more worker tasks panicked.
    #[error("{0} worker task(s) panicked")]
    WorkerPanicked(usize),
}

/// A job on its way to a worker, together with its completion guard.
#[derive(Debug)]
pub struct Dispatched {
    /// The job to run.
    pub job: Job,
    completion: Completion,
}

impl Dispatched {
    pub fn new(job: Job, completion: Completion) -> Self {
        Self { job, completion }
    }
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn. Zero is treated as one.
    pub num_workers: usize,
    /// Directory for per-worker pidfiles handed to the migration tool.
    pub pid_dir: Option<PathBuf>,
    /// Maximum time allowed for a single job. `None` waits forever.
    pub job_timeout: Option<Duration>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 2,
            pid_dir: None,
            job_timeout: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            ..Default::default()
        }
    }

    /// Sets the pidfile directory.
    pub fn with_pid_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pid_dir = Some(dir.into());
        self
    }

    /// Sets the job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing jobs.
    pub active_workers: usize,
    /// Highest number of jobs observed in flight at once.
    pub peak_active_workers: usize,
    /// Total number of jobs completed successfully.
    pub jobs_completed: u64,
    /// Total number of jobs that failed.
    pub jobs_failed: u64,
    /// Failed jobs whose failure log could not be written.
    pub log_write_failures: u64,
    /// Average job processing duration.
    pub average_job_duration: Duration,
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    log_write_failures: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
    peak_active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            log_write_failures: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
            peak_active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_log_write_failure(&self) {
        self.log_write_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active_workers.fetch_max(active, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            peak_active_workers: self.peak_active_workers.load(Ordering::SeqCst) as usize,
            jobs_completed: completed,
            jobs_failed: failed,
            log_write_failures: self.log_write_failures.load(Ordering::SeqCst),
            average_job_duration: average_duration,
        }
    }
}

/// Worker pool that manages multiple workers processing jobs from a queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<JobQueue<Dispatched>>,
    migrator: Arc<dyn Migrator>,
    failure_log: FailureLog,
    events: EventSink,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    /// Creates a new worker pool on top of an existing queue.
    ///
    /// # Arguments
    ///
    /// * `config` - Pool configuration
    /// * `queue` - Queue the workers drain
    /// * `migrator` - Migration operation each job is handed to
    /// * `failure_log` - Where failure details are written
    /// * `events` - Progress event sink
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<JobQueue<Dispatched>>,
        migrator: Arc<dyn Migrator>,
        failure_log: FailureLog,
        events: EventSink,
    ) -> Self {
        Self {
            config,
            queue,
            migrator,
            failure_log,
            events,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Starts all workers in the pool.
    ///
    /// Workers begin waiting on the queue immediately.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyRunning` if the pool is already running.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(PoolError::AlreadyRunning);
        }

        let num_workers = self.num_workers();
        for number in 1..=num_workers {
            let worker = Worker {
                id: format!("worker-{}", number),
                number,
                queue: Arc::clone(&self.queue),
                migrator: Arc::clone(&self.migrator),
                failure_log: self.failure_log.clone(),
                events: self.events.clone(),
                pid_dir: self.config.pid_dir.clone(),
                job_timeout: self.config.job_timeout,
                stats: Arc::clone(&self.stats),
            };

            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        info!(
            num_workers,
            migrator = self.migrator.name(),
            "Worker pool started"
        );

        Ok(())
    }

    /// Waits for every worker to exit.
    ///
    /// Workers exit once the queue is closed and drained, so the queue must
    /// be closed before calling this or it never returns.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotRunning` if the pool was never started, and
    /// `PoolError::WorkerPanicked` if any worker task panicked.
    pub async fn join(&mut self) -> Result<PoolStats, PoolError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(PoolError::NotRunning);
        }

        let mut panicked = 0;
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
                panicked += 1;
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Worker pool stopped");

        if panicked > 0 {
            return Err(PoolError::WorkerPanicked(panicked));
        }
        Ok(self.stats())
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.num_workers())
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers.max(1)
    }
}

/// A single worker that processes jobs from the queue.
pub struct Worker {
    /// Identifier used in logs and events.
    id: String,
    /// 1-based worker number, used for the pidfile name.
    number: usize,
    queue: Arc<JobQueue<Dispatched>>,
    migrator: Arc<dyn Migrator>,
    failure_log: FailureLog,
    events: EventSink,
    pid_dir: Option<PathBuf>,
    job_timeout: Option<Duration>,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    /// Main worker loop.
    ///
    /// Processes jobs until the queue is closed and empty.
    async fn run(self) {
        info!(worker_id = %self.id, "Worker started");

        while let Some(dispatched) = self.queue.dequeue().await {
            self.process_job(dispatched).await;
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Processes a single job and releases its completion guard.
    async fn process_job(&self, dispatched: Dispatched) {
        let Dispatched { job, completion } = dispatched;
        let log_identity = job.log_identity();

        info!(
            worker_id = %self.id,
            log_identity = %log_identity,
            source_host = %job.source.host,
            target_host = %job.target.host,
            "Processing job"
        );
        self.events.emit(RunEvent::JobStarted {
            worker_id: self.id.clone(),
            source_user: job.source.user.clone(),
            log_identity: log_identity.clone(),
        });

        self.stats.increment_active();
        let result = self.execute_job(&job).await;
        self.stats.decrement_active();
        debug!(
            worker_id = %self.id,
            log_identity = %log_identity,
            status = %result.status,
            "Migration returned"
        );

        match result.status {
            JobStatus::Completed => {
                self.stats.record_completion(result.duration);
                info!(
                    worker_id = %self.id,
                    log_identity = %log_identity,
                    duration_ms = result.duration.as_millis(),
                    "Job completed successfully"
                );
                self.events.emit(RunEvent::JobFinished {
                    worker_id: self.id.clone(),
                    source_user: job.source.user.clone(),
                    log_identity,
                    duration: result.duration,
                });
            }
            JobStatus::Failed => {
                self.stats.record_failure(result.duration);
                let detail = result.error.unwrap_or_default();
                self.handle_failure(&job, log_identity, detail).await;
            }
        }

        completion.done();
    }

    /// Writes the failure log and reports the failure.
    ///
    /// A log write error is reported alongside the job failure; it does not
    /// stop this worker or any other.
    async fn handle_failure(&self, job: &Job, log_identity: String, detail: String) {
        let (log_path, log_error) = match self.failure_log.record(job, &detail).await {
            Ok(path) => (Some(path), None),
            Err(e) => {
                self.stats.record_log_write_failure();
                error!(
                    worker_id = %self.id,
                    log_identity = %log_identity,
                    error = %e,
                    "Failed to write failure log"
                );
                (None, Some(e.to_string()))
            }
        };

        warn!(
            worker_id = %self.id,
            log_identity = %log_identity,
            error = %detail,
            "Job failed"
        );
        self.events.emit(RunEvent::JobFailed {
            worker_id: self.id.clone(),
            source_user: job.source.user.clone(),
            log_identity,
            detail,
            log_path,
            log_error,
        });
    }

    /// Runs the migration, applying the job timeout if one is configured.
    async fn execute_job(&self, job: &Job) -> JobResult {
        let start_time = Instant::now();

        let mut request = MigrationRequest::new(job, self.failure_log.dir());
        if let Some(ref dir) = self.pid_dir {
            request = request.with_pid_file(dir.join(format!("imapsync_{}.pid", self.number)));
        }

        let outcome = match self.job_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.migrator.migrate(&request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(MigrationError::Timeout(limit)),
                }
            }
            None => self.migrator.migrate(&request).await,
        };

        let duration = start_time.elapsed();
        match outcome {
            Ok(()) => JobResult::success(duration),
            Err(e) => JobResult::failure(e.to_string(), duration),
        }
    }
}
