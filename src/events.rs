//! Run events and their console rendering.
//!
//! Workers and the driver emit structured [`RunEvent`]s into an
//! [`EventSink`]. Emitting never waits. A [`ConsoleReporter`] drains the
//! channel and turns events into the human-readable progress lines.
//!
//! ```ignore
//! let (events, rx) = EventSink::channel();
//! let reporter = tokio::spawn(ConsoleReporter::stdout().run(rx));
//! runner.run(events).await?;
//! reporter.await?;
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

use crate::runner::RunSummary;

/// Something observable that happened during a run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The driver validated its inputs and is about to dispatch.
    RunStarted {
        /// Identifier of this run, also attached to tracing output.
        run_id: String,
        /// Number of workers in the pool.
        workers: usize,
    },

    /// A worker picked up a job.
    JobStarted {
        worker_id: String,
        source_user: String,
        log_identity: String,
    },

    /// The migration tool reported success.
    JobFinished {
        worker_id: String,
        source_user: String,
        log_identity: String,
        duration: Duration,
    },

    /// The migration tool failed.
    JobFailed {
        worker_id: String,
        source_user: String,
        log_identity: String,
        /// Failure detail as written to the log file.
        detail: String,
        /// Where the detail was written, if writing succeeded.
        log_path: Option<PathBuf>,
        /// Why the detail could not be written, if writing failed.
        log_error: Option<String>,
    },

    /// An input line was rejected and not dispatched.
    LineSkipped { line: usize, reason: String },

    /// Every dispatched job has completed.
    RunFinished { summary: RunSummary },
}

/// Non-blocking sender half for run events.
///
/// A disabled sink drops everything, and so does a sink whose receiver is gone.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl EventSink {
    /// Creates a sink and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that discards every event.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits an event without waiting.
    pub fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.tx {
            // Receiver gone means nobody is watching; the run carries on.
            let _ = tx.send(event);
        }
    }
}

/// Renders run events as progress lines.
pub struct ConsoleReporter<W> {
    out: W,
}

impl ConsoleReporter<std::io::Stdout> {
    /// Reporter writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Renders events until every sink is dropped, then returns the writer.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RunEvent>) -> W {
        while let Some(event) = rx.recv().await {
            if let Err(e) = self.render(&event) {
                warn!(error = %e, "Failed to write progress output");
            }
        }
        self.out
    }

    /// Writes the line(s) for one event. Some events render nothing.
    pub fn render(&mut self, event: &RunEvent) -> std::io::Result<()> {
        match event {
            RunEvent::RunStarted { .. } => return Ok(()),
            RunEvent::JobStarted { source_user, .. } => {
                writeln!(self.out, "Started {}", source_user)?;
            }
            RunEvent::JobFinished { source_user, .. } => {
                writeln!(self.out, "FINISHED {}", source_user)?;
            }
            RunEvent::JobFailed {
                source_user,
                log_path,
                log_error,
                ..
            } => match (log_path, log_error) {
                (Some(path), _) => {
                    writeln!(self.out, "ERROR {} (see {})", source_user, path.display())?
                }
                (None, Some(err)) => writeln!(
                    self.out,
                    "ERROR {} (failure log could not be written: {})",
                    source_user, err
                )?,
                (None, None) => writeln!(self.out, "ERROR {}", source_user)?,
            },
            RunEvent::LineSkipped { reason, .. } => {
                // The reason already names the line.
                writeln!(self.out, "SKIPPED {}", reason)?;
            }
            RunEvent::RunFinished { summary } => {
                writeln!(self.out)?;
                writeln!(self.out, "DONE")?;
                writeln!(
                    self.out,
                    "{} finished, {} failed, {} skipped",
                    summary.completed, summary.failed, summary.skipped_lines
                )?;
            }
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_all(events: &[RunEvent]) -> String {
        let mut reporter = ConsoleReporter::new(Vec::new());
        for event in events {
            reporter.render(event).expect("render");
        }
        String::from_utf8(reporter.out).expect("utf8")
    }

    #[test]
    fn test_render_job_lifecycle() {
        let text = render_all(&[
            RunEvent::JobStarted {
                worker_id: "worker-0".to_string(),
                source_user: "alice".to_string(),
                log_identity: "alice_TO_bob".to_string(),
            },
            RunEvent::JobFinished {
                worker_id: "worker-0".to_string(),
                source_user: "alice".to_string(),
                log_identity: "alice_TO_bob".to_string(),
                duration: Duration::from_secs(1),
            },
        ]);

        assert_eq!(text, "Started alice\nFINISHED alice\n");
    }

    #[test]
    fn test_render_failures() {
        let text = render_all(&[
            RunEvent::JobFailed {
                worker_id: "worker-1".to_string(),
                source_user: "carol".to_string(),
                log_identity: "carol_TO_dave".to_string(),
                detail: "connection refused".to_string(),
                log_path: Some(PathBuf::from("logs/carol_TO_dave.log")),
                log_error: None,
            },
            RunEvent::JobFailed {
                worker_id: "worker-1".to_string(),
                source_user: "erin".to_string(),
                log_identity: "erin_TO_frank".to_string(),
                detail: "connection refused".to_string(),
                log_path: None,
                log_error: Some("permission denied".to_string()),
            },
        ]);

        assert!(text.contains("ERROR carol (see logs/carol_TO_dave.log)"));
        assert!(text.contains("ERROR erin (failure log could not be written: permission denied)"));
    }

    #[test]
    fn test_render_run_finished() {
        let summary = RunSummary {
            completed: 3,
            failed: 1,
            skipped_lines: 2,
            ..RunSummary::default()
        };
        let text = render_all(&[RunEvent::RunFinished { summary }]);
        assert_eq!(text, "\nDONE\n3 finished, 1 failed, 2 skipped\n");
    }

    #[tokio::test]
    async fn test_reporter_drains_channel() {
        let (sink, rx) = EventSink::channel();
        sink.emit(RunEvent::LineSkipped {
            line: 4,
            reason: "line 4: expected 6 '|'-separated fields, found 2".to_string(),
        });
        drop(sink);

        let out = ConsoleReporter::new(Vec::new()).run(rx).await;
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "SKIPPED line 4: expected 6 '|'-separated fields, found 2\n"
        );
    }

    #[test]
    fn test_disabled_sink_is_silent() {
        EventSink::disabled().emit(RunEvent::LineSkipped {
            line: 1,
            reason: "ignored".to_string(),
        });
    }
}
