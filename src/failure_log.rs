//! Per-job failure artifacts.
//!
//! A failed job appends a block to `<log dir>/<log identity>.log`. Successful
//! jobs never touch the directory. The file is opened in append mode, so
//! colliding identities share one file instead of overwriting each other.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::FailureLogError;
use crate::scheduler::Job;

/// Marker line written before every failure detail.
pub const FAILURE_MARKER: &str = "An error occured:";

/// Writes failure details into the log directory.
#[derive(Debug, Clone)]
pub struct FailureLog {
    dir: PathBuf,
}

impl FailureLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Log directory shared by the migration tool and this sink.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `job`.
    pub fn artifact_path(&self, job: &Job) -> PathBuf {
        self.dir.join(job.log_file_name())
    }

    /// Prepares the directory before any worker starts.
    ///
    /// With `clear` set, everything left over from a previous run is removed
    /// first. The directory exists afterwards either way.
    ///
    /// # Errors
    ///
    /// Returns `FailureLogError::Prepare` if removal or creation fails.
    pub async fn prepare(&self, clear: bool) -> Result<(), FailureLogError> {
        if clear {
            match fs::remove_dir_all(&self.dir).await {
                Ok(()) => info!(dir = %self.dir.display(), "Cleared log directory"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(FailureLogError::Prepare {
                        path: self.dir.clone(),
                        source,
                    })
                }
            }
        }

        self.ensure_dir().await
    }

    /// Appends the failure block for `job` and returns the artifact path.
    ///
    /// # Errors
    ///
    /// Returns `FailureLogError` if the directory or file cannot be written.
    pub async fn record(&self, job: &Job, detail: &str) -> Result<PathBuf, FailureLogError> {
        self.ensure_dir().await?;

        let path = self.artifact_path(job);
        let write_error = |source| FailureLogError::Write {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(write_error)?;

        file.write_all(failure_block(detail).as_bytes())
            .await
            .map_err(write_error)?;
        file.flush().await.map_err(write_error)?;

        debug!(path = %path.display(), "Recorded job failure");
        Ok(path)
    }

    async fn ensure_dir(&self) -> Result<(), FailureLogError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| FailureLogError::Prepare {
                path: self.dir.clone(),
                source,
            })
    }
}

fn failure_block(detail: &str) -> String {
    format!("\n\n{}\n{}", FAILURE_MARKER, detail)
}
