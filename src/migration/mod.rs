//! External migration operation.
//!
//! Workers never spawn the migration tool themselves. They call a
//! [`Migrator`], so tests can swap the real process for a fake.
//!
//! # Example
//!
//! ```ignore
//! use mailmover::migration::{Imapsync, Migrator, MigrationRequest};
//!
//! let imapsync = Imapsync::locate("imapsync")?;
//! let request = MigrationRequest::new(&job, Path::new("logs"))
//!     .with_pid_file("/tmp/imapsync_1.pid");
//! imapsync.migrate(&request).await?;
//! ```

pub mod imapsync;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{MigrationError, RunError};
use crate::scheduler::Job;

pub use imapsync::{find_on_path, Imapsync};

/// Everything the migration tool needs to run one job.
#[derive(Debug, Clone)]
pub struct MigrationRequest<'a> {
    /// The job to migrate.
    pub job: &'a Job,
    /// Directory the tool writes its own log into.
    pub log_dir: &'a Path,
    /// Log file name inside `log_dir`, the job's log identity plus `.log`.
    pub log_file: String,
    /// Optional pidfile path for the tool.
    pub pid_file: Option<PathBuf>,
}

impl<'a> MigrationRequest<'a> {
    pub fn new(job: &'a Job, log_dir: &'a Path) -> Self {
        Self {
            job,
            log_dir,
            log_file: job.log_file_name(),
            pid_file: None,
        }
    }

    /// Sets the pidfile path.
    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }
}

/// Performs one mailbox migration.
///
/// `Ok(())` is success. Any error is a failure of that job only; its
/// display text is what ends up in the job's log file.
#[async_trait]
pub trait Migrator: Send + Sync {
    async fn migrate(&self, request: &MigrationRequest<'_>) -> Result<(), MigrationError>;

    /// Short name used in log output.
    fn name(&self) -> &str;

    /// Checked once before a run starts. A missing tool is a startup error.
    fn check_available(&self) -> Result<(), RunError> {
        Ok(())
    }
}
