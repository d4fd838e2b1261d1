//! Job definitions for the scheduler.
//!
//! This module defines the core job types used in the scheduling system:
//!
//! - `Credentials`: host, user and password of one mailbox
//! - `Job`: a source-to-target migration unit
//! - `JobResult`: result of job execution
//! - `JobStatus`: status of a completed job

use std::fmt;
use std::time::Duration;

/// Extension of every per-job log file.
const LOG_FILE_EXTENSION: &str = "log";

/// Login data for one side of a migration.
///
/// Values are opaque and carried as-is to the migration tool.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// IMAP host name or address.
    pub host: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
        }
    }
}

// Passwords stay out of debug output and tracing fields.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// A job representing one mailbox migration.
///
/// Jobs are immutable once built. Workers only ever read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Mailbox to copy from.
    pub source: Credentials,
    /// Mailbox to copy into.
    pub target: Credentials,
}

impl Job {
    pub fn new(source: Credentials, target: Credentials) -> Self {
        Self { source, target }
    }

    /// Deterministic name of this job's failure artifact, `<source>_TO_<target>`.
    ///
    /// Two jobs with the same user pair share an identity and therefore a log file.
    pub fn log_identity(&self) -> String {
        format!("{}_TO_{}", self.source.user, self.target.user)
    }

    /// File name of this job's log, `<log identity>.log`.
    pub fn log_file_name(&self) -> String {
        format!("{}.{}", self.log_identity(), LOG_FILE_EXTENSION)
    }
}

/// Status of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The migration tool reported success.
    Completed,
    /// The migration tool failed, could not be launched, or timed out.
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one job execution.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Final status.
    pub status: JobStatus,
    /// Failure detail, present only for failed jobs.
    pub error: Option<String>,
    /// Wall time spent in the migration tool.
    pub duration: Duration,
}

impl JobResult {
    /// Creates a successful result.
    pub fn success(duration: Duration) -> Self {
        Self {
            status: JobStatus::Completed,
            error: None,
            duration,
        }
    }

    /// Creates a failed result carrying the failure detail.
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_job(source_user: &str, target_user: &str) -> Job {
        Job::new(
            Credentials::new("imap.old.example", source_user, "secret1"),
            Credentials::new("imap.new.example", target_user, "secret2"),
        )
    }

    #[test]
    fn test_log_identity() {
        let job = create_test_job("alice", "bob");
        assert_eq!(job.log_identity(), "alice_TO_bob");
        assert_eq!(job.log_file_name(), "alice_TO_bob.log");
    }

    #[test]
    fn test_log_identity_collision() {
        let a = create_test_job("alice", "bob");
        let mut b = create_test_job("alice", "bob");
        b.source.host = "other.example".to_string();

        assert_ne!(a, b);
        assert_eq!(a.log_identity(), b.log_identity());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("host", "user", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_job_result_constructors() {
        let ok = JobResult::success(Duration::from_secs(3));
        assert_eq!(ok.status, JobStatus::Completed);
        assert_eq!(ok.status.to_string(), "completed");
        assert!(ok.error.is_none());

        let failed = JobResult::failure("connection refused", Duration::ZERO);
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.status.to_string(), "failed");
        assert_eq!(failed.error.as_deref(), Some("connection refused"));
    }
}
