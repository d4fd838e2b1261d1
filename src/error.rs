//! Error types for mailmover operations.
//!
//! Errors fall into two classes:
//! - Startup errors (`RunError`) abort the whole run before any worker starts
//! - Per-job errors (`MigrationError`, `FailureLogError`) are isolated to the
//!   job that produced them and never reach sibling workers

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::{PoolError, QueueError};

/// Errors produced while turning an input line into a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobParseError {
    #[error("line {line}: expected 6 '|'-separated fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("line {line}: field '{field}' is empty")]
    EmptyField { line: usize, field: &'static str },

    #[error("line {line}: not valid UTF-8")]
    InvalidUtf8 { line: usize },
}

/// Errors reported by the external migration operation.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to launch '{tool}': {source}")]
    Launch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}{}", format_stderr(.stderr))]
    NonZeroExit {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{}", trimmed)
    }
}

/// Errors writing to the failure log area.
#[derive(Debug, Error)]
pub enum FailureLogError {
    #[error("failed to prepare log directory '{path}': {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write log file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Startup-class errors. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("migration tool '{0}' was not found on PATH")]
    ToolNotFound(String),

    #[error("cannot read input file '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    FailureLog(#[from] FailureLogError),

    #[error("job queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("run already started")]
    AlreadyStarted,
}
