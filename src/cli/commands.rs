//! CLI definition for mailmover.
//!
//! A single command: read the account list, run the migration tool for
//! every line with a bounded number of parallel workers, print progress.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::events::{ConsoleReporter, EventSink};
use crate::migration::Imapsync;
use crate::runner::{
    RunConfig, RunSummary, Runner, DEFAULT_INPUT, DEFAULT_LOG_DIR, DEFAULT_TOOL,
};

/// Batch mailbox migration runner.
#[derive(Parser, Debug)]
#[command(name = "mailmover")]
#[command(about = "Migrate many mailboxes with imapsync, a few at a time")]
#[command(version)]
#[command(
    long_about = "mailmover reads an account list and runs imapsync once per line, with a bounded number of parallel workers.\n\nEach line holds six '|'-separated fields:\n  source_host|source_user|source_password|target_host|target_user|target_password\n\nFailed migrations leave '<source_user>_TO_<target_user>.log' in the log directory.\n\nExample usage:\n  mailmover --source accounts.txt --threads 4"
)]
pub struct Cli {
    /// File containing the accounts data.
    #[arg(short, long, env = "MAILMOVER_SOURCE", default_value = DEFAULT_INPUT)]
    pub source: PathBuf,

    /// Amount of parallel processes to use (values below 1 mean 1).
    #[arg(
        short,
        long,
        env = "MAILMOVER_THREADS",
        default_value = "2",
        allow_negative_numbers = true
    )]
    pub threads: i64,

    /// Directory for imapsync logs and failure reports.
    #[arg(long, env = "MAILMOVER_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Keep the log directory from previous runs instead of clearing it.
    #[arg(long, env = "MAILMOVER_KEEP_LOGS")]
    pub keep_logs: bool,

    /// Migration tool to run, by name on PATH or by path.
    #[arg(long, env = "MAILMOVER_TOOL", default_value = DEFAULT_TOOL)]
    pub tool: String,

    /// Directory for per-worker imapsync pidfiles (imapsync_<worker>.pid).
    #[arg(long, env = "MAILMOVER_PID_DIR")]
    pub pid_dir: Option<PathBuf>,

    /// Give up on a single migration after this many seconds.
    #[arg(long, env = "MAILMOVER_JOB_TIMEOUT")]
    pub job_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// Builds the run configuration from the parsed flags.
    pub fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.source)
            .with_workers(self.threads)
            .with_log_dir(&self.log_dir)
            .with_clear_logs(!self.keep_logs)
            .with_tool(&self.tool);

        if let Some(ref dir) = self.pid_dir {
            config = config.with_pid_dir(dir);
        }
        if let Some(secs) = self.job_timeout {
            config = config.with_job_timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Parse CLI arguments without running the command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
///
/// Job failures do not make this fail; they are counted in the summary.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<RunSummary> {
    let config = cli.run_config();
    info!(?config, "Starting mailmover");

    let migrator = Imapsync::locate(&config.tool)
        .with_context(|| format!("'{}' must be installed to migrate mailboxes", config.tool))?;

    let (events, rx) = EventSink::channel();
    let reporter = tokio::spawn(ConsoleReporter::stdout().run(rx));

    let mut runner = Runner::new(config, Arc::new(migrator));
    let result = runner.run(events).await;

    // The runner dropped its sink; the reporter exits once the backlog is printed.
    reporter.await.context("progress reporter failed")?;

    let summary = result.context("migration run aborted")?;
    Ok(summary)
}
