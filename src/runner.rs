//! Dispatch driver.
//!
//! The [`Runner`] owns one run from start to finish:
//!
//! ```text
//! INIT → VALIDATED → DISPATCHING → DRAINING → DONE
//! ```
//!
//! - `INIT → VALIDATED`: the migration tool is available and the input opens
//! - `VALIDATED → DISPATCHING`: the log directory is prepared, workers start
//! - `DISPATCHING → DRAINING`: end of input reached, every job registered
//! - `DRAINING → DONE`: every dispatched job completed, queue closed, pool joined
//!
//! There is no way back; a runner runs once. If the input fails partway
//! through, dispatching stops but the jobs already queued still drain
//! before the error is returned.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncBufRead;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{FailureLogError, RunError};
use crate::events::{EventSink, RunEvent};
use crate::failure_log::FailureLog;
use crate::migration::Migrator;
use crate::scheduler::{
    CompletionTracker, Dispatched, JobQueue, JobSource, ParsedLine, WorkerPool, WorkerPoolConfig,
};

/// Default account list.
pub const DEFAULT_INPUT: &str = "accounts.txt";

/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default migration tool.
pub const DEFAULT_TOOL: &str = "imapsync";

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Smallest allowed number of workers.
pub const MIN_WORKERS: usize = 1;

/// Largest allowed number of workers. Each one is a concurrent imapsync process.
pub const MAX_WORKERS: usize = 1024;

/// Clamps a requested worker count into `MIN_WORKERS..=MAX_WORKERS`.
pub fn normalize_workers(requested: i64) -> usize {
    usize::try_from(requested)
        .unwrap_or(MIN_WORKERS)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

/// Configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Account list, one job per line.
    pub input: PathBuf,
    /// Number of workers, and the queue capacity.
    pub workers: usize,
    /// Directory for the tool's logs and the failure artifacts.
    pub log_dir: PathBuf,
    /// Remove the log directory's contents before the run.
    pub clear_logs: bool,
    /// Migration tool name or path, passed to the migrator at construction.
    pub tool: String,
    /// Directory for per-worker pidfiles.
    pub pid_dir: Option<PathBuf>,
    /// Maximum time for a single job.
    pub job_timeout: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            workers: DEFAULT_WORKERS,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            clear_logs: true,
            tool: DEFAULT_TOOL.to_string(),
            pid_dir: None,
            job_timeout: None,
        }
    }
}

impl RunConfig {
    /// Creates a configuration reading from `input`.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    /// Sets the worker count. Zero and negative values mean one; values
    /// above [`MAX_WORKERS`] are capped.
    pub fn with_workers(mut self, requested: i64) -> Self {
        self.workers = normalize_workers(requested);
        if requested > MAX_WORKERS as i64 {
            warn!(requested, workers = self.workers, "Worker count capped");
        }
        self
    }

    /// Sets the log directory.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Sets whether the log directory is cleared before the run.
    pub fn with_clear_logs(mut self, clear: bool) -> Self {
        self.clear_logs = clear;
        self
    }

    /// Sets the migration tool.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Sets the pidfile directory.
    pub fn with_pid_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.pid_dir = Some(dir.into());
        self
    }

    /// Sets the per-job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    fn pool_config(&self) -> WorkerPoolConfig {
        let mut config = WorkerPoolConfig::new(self.workers);
        config.pid_dir = self.pid_dir.clone();
        config.job_timeout = self.job_timeout;
        config
    }
}

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunPhase {
    Init,
    Validated,
    Dispatching,
    Draining,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Init => write!(f, "init"),
            RunPhase::Validated => write!(f, "validated"),
            RunPhase::Dispatching => write!(f, "dispatching"),
            RunPhase::Draining => write!(f, "draining"),
            RunPhase::Done => write!(f, "done"),
        }
    }
}

/// Outcome counts of a finished run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Identifier of the run.
    pub run_id: String,
    /// Jobs handed to the pool.
    pub dispatched: u64,
    /// Jobs the migration tool reported as successful.
    pub completed: u64,
    /// Jobs that failed.
    pub failed: u64,
    /// Input lines rejected as malformed.
    pub skipped_lines: u64,
    /// Failed jobs whose failure log could not be written.
    pub log_write_failures: u64,
    /// Highest number of jobs in flight at once.
    pub peak_concurrency: usize,
    /// Wall time of the whole run.
    pub duration: Duration,
}

impl RunSummary {
    /// Returns whether every line became a successful job.
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped_lines == 0
    }

    /// Share of dispatched jobs that succeeded, as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.failed;
        if total == 0 {
            return 0.0;
        }
        (self.completed as f64 / total as f64) * 100.0
    }
}

/// Drives one batch migration run.
pub struct Runner {
    config: RunConfig,
    migrator: Arc<dyn Migrator>,
    phase: RunPhase,
    run_id: String,
}

impl Runner {
    pub fn new(config: RunConfig, migrator: Arc<dyn Migrator>) -> Self {
        Self {
            config,
            migrator,
            phase: RunPhase::Init,
            run_id: Uuid::new_v4().to_string(),
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Identifier attached to this run's tracing output.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs every job in the configured input file to completion.
    ///
    /// Individual job failures are reported through `events` and the
    /// summary; only startup-class problems return an error.
    ///
    /// # Errors
    ///
    /// Returns `RunError` if the tool or input is unavailable, the log
    /// directory cannot be prepared, the input cannot be read, or the
    /// runner was already used.
    pub async fn run(&mut self, events: EventSink) -> Result<RunSummary, RunError> {
        self.validate()?;
        let source = JobSource::open(&self.config.input).await?;
        self.dispatch_instrumented(source, events).await
    }

    /// Like [`Runner::run`], but reads jobs from an already opened source.
    ///
    /// # Errors
    ///
    /// Same as [`Runner::run`], minus opening the input file.
    pub async fn run_with_source<R>(
        &mut self,
        source: JobSource<R>,
        events: EventSink,
    ) -> Result<RunSummary, RunError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.validate()?;
        self.dispatch_instrumented(source, events).await
    }

    fn validate(&self) -> Result<(), RunError> {
        if self.phase != RunPhase::Init {
            return Err(RunError::AlreadyStarted);
        }
        self.migrator.check_available()
    }

    async fn dispatch_instrumented<R>(
        &mut self,
        source: JobSource<R>,
        events: EventSink,
    ) -> Result<RunSummary, RunError>
    where
        R: AsyncBufRead + Unpin,
    {
        let span = info_span!("run", run_id = %self.run_id);
        self.dispatch(source, events).instrument(span).await
    }

    async fn dispatch<R>(
        &mut self,
        mut source: JobSource<R>,
        events: EventSink,
    ) -> Result<RunSummary, RunError>
    where
        R: AsyncBufRead + Unpin,
    {
        let started = Instant::now();

        let log_dir = absolute_dir(&self.config.log_dir)?;
        self.transition(RunPhase::Validated);

        // Finish preparing the directory before any worker can write into it.
        let failure_log = FailureLog::new(log_dir);
        failure_log.prepare(self.config.clear_logs).await?;

        let pool_config = self.config.pool_config();
        let queue = Arc::new(JobQueue::bounded(pool_config.num_workers)?);
        let tracker = CompletionTracker::new();
        let mut pool = WorkerPool::new(
            pool_config,
            Arc::clone(&queue),
            Arc::clone(&self.migrator),
            failure_log,
            events.clone(),
        );
        pool.start()?;

        events.emit(RunEvent::RunStarted {
            run_id: self.run_id.clone(),
            workers: pool.num_workers(),
        });
        self.transition(RunPhase::Dispatching);

        let mut skipped_lines = 0u64;
        let mut read_error = None;
        loop {
            let parsed = match source.next().await {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Input became unreadable, draining queued jobs");
                    read_error = Some(e);
                    break;
                }
            };

            match parsed {
                ParsedLine::Job { line, job } => {
                    debug!(line, log_identity = %job.log_identity(), "Dispatching job");
                    // Register before enqueueing so the count never runs behind.
                    let completion = tracker.register();
                    queue.enqueue(Dispatched::new(job, completion)).await?;
                }
                ParsedLine::Malformed { line, error } => {
                    warn!(line, error = %error, "Skipping malformed input line");
                    skipped_lines += 1;
                    events.emit(RunEvent::LineSkipped {
                        line,
                        reason: error.to_string(),
                    });
                }
            }
        }
        self.transition(RunPhase::Draining);

        tracker.wait().await;
        queue.close();
        let stats = pool.join().await?;
        self.transition(RunPhase::Done);

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            dispatched: tracker.registered(),
            completed: stats.jobs_completed,
            failed: stats.jobs_failed,
            skipped_lines,
            log_write_failures: stats.log_write_failures,
            peak_concurrency: stats.peak_active_workers,
            duration: started.elapsed(),
        };

        info!(
            dispatched = summary.dispatched,
            completed = summary.completed,
            failed = summary.failed,
            skipped_lines = summary.skipped_lines,
            success_rate = summary.success_rate(),
            average_job_ms = stats.average_job_duration.as_millis(),
            duration_ms = summary.duration.as_millis(),
            "Run finished"
        );
        events.emit(RunEvent::RunFinished {
            summary: summary.clone(),
        });

        match read_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    fn transition(&mut self, next: RunPhase) {
        debug_assert!(next > self.phase, "run phases only move forward");
        info!(from = %self.phase, to = %next, "Run phase changed");
        self.phase = next;
    }
}

fn absolute_dir(dir: &Path) -> Result<PathBuf, RunError> {
    std::path::absolute(dir).map_err(|source| {
        RunError::FailureLog(FailureLogError::Prepare {
            path: dir.to_path_buf(),
            source,
        })
    })
}
