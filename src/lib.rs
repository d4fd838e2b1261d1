//! mailmover: batch mailbox migration runner.
//!
//! Reads a list of source/target account pairs and runs an external
//! migration tool (imapsync) once per pair, with a bounded number of
//! concurrent workers. Failures are isolated per job and recorded in a
//! per-job log file.

pub mod cli;
pub mod error;
pub mod events;
pub mod failure_log;
pub mod migration;
pub mod runner;
pub mod scheduler;

// Re-export commonly used types
pub use error::{FailureLogError, JobParseError, MigrationError, RunError};
pub use runner::{RunConfig, RunPhase, RunSummary, Runner};
