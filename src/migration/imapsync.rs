//! imapsync process adapter.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MigrationError, RunError};

use super::{MigrationRequest, Migrator};

/// Runs the `imapsync` binary once per job.
#[derive(Debug, Clone)]
pub struct Imapsync {
    program: PathBuf,
}

impl Imapsync {
    /// Resolves `tool` on `PATH` (or as a path) and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `RunError::ToolNotFound` if the program cannot be found.
    pub fn locate(tool: impl AsRef<OsStr>) -> Result<Self, RunError> {
        let tool = tool.as_ref();
        let program = find_on_path(tool)
            .ok_or_else(|| RunError::ToolNotFound(tool.to_string_lossy().into_owned()))?;

        Ok(Self::new(program))
    }

    /// Wraps a program path without checking it exists.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Builds the imapsync argument list for a request.
    pub fn args(&self, request: &MigrationRequest<'_>) -> Vec<OsString> {
        let job = request.job;
        let mut args: Vec<OsString> = vec![
            "--host1".into(),
            job.source.host.clone().into(),
            "--user1".into(),
            job.source.user.clone().into(),
            "--password1".into(),
            job.source.password.clone().into(),
            "--host2".into(),
            job.target.host.clone().into(),
            "--user2".into(),
            job.target.user.clone().into(),
            "--password2".into(),
            job.target.password.clone().into(),
            "--logdir".into(),
            request.log_dir.as_os_str().to_owned(),
            "--logfile".into(),
            request.log_file.clone().into(),
        ];

        if let Some(ref pid_file) = request.pid_file {
            args.push("--pidfile".into());
            args.push(pid_file.as_os_str().to_owned());
        }

        args
    }
}

#[async_trait]
impl Migrator for Imapsync {
    async fn migrate(&self, request: &MigrationRequest<'_>) -> Result<(), MigrationError> {
        let tool = self.name().to_string();
        debug!(
            program = %self.program.display(),
            log_file = %request.log_file,
            "Spawning migration tool"
        );

        let output = Command::new(&self.program)
            .args(self.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MigrationError::Launch {
                tool: tool.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(MigrationError::NonZeroExit {
                tool,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }

    fn check_available(&self) -> Result<(), RunError> {
        find_on_path(&self.program)
            .map(|_| ())
            .ok_or_else(|| RunError::ToolNotFound(self.program.display().to_string()))
    }

    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("imapsync")
    }
}

/// Finds an executable the way a shell would.
///
/// Names containing a path separator are checked directly; bare names are
/// searched in each `PATH` entry.
pub fn find_on_path(tool: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which(tool.as_ref()).ok()
}
