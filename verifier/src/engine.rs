//! Progress notification and the per-run step tracker.
//!
//! The orchestrators never print; they hold a [`Tracker`] that mutates the
//! [`Progress`] table and hands a full snapshot to an [`Observer`] after
//! every transition. Free-form messages use four severities. A
//! [`CommandJournal`] sits between a pipeline and its executor so that every
//! command, and the output of every failed one, reaches the observer too.

use crate::error::Result;
use crate::exec::{CommandExecutor, command_line, failure_text};
use crate::progress::{Progress, StepKey, StepStatus};
use camino::Utf8Path;
use log::{debug, error, info, trace, warn};
use std::cell::RefCell;
use std::fmt;
use std::process::Output;

/// Severity of an observer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Detailed diagnostics such as command output.
    Trace,
    /// Noteworthy facts about the run.
    Notice,
    /// Non-fatal concerns.
    Warning,
    /// Errors behind a failed step.
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trace => "trace",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Failure => "failure",
        })
    }
}

/// Receives progress snapshots and messages from a pipeline run.
pub trait Observer<K: StepKey> {
    /// Called with the whole table after every transition.
    fn progress(&mut self, snapshot: &Progress<K>);

    /// Called for each trace, notice, warning, or failure message.
    fn message(&mut self, severity: Severity, text: &str);
}

/// Forwards messages to the `log` facade and logs each transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl<K: StepKey> Observer<K> for LogObserver {
    fn progress(&mut self, snapshot: &Progress<K>) {
        let line = snapshot
            .iter()
            .map(|step| format!("{}={}", step.name(), step.status()))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("progress: {line}");
    }

    fn message(&mut self, severity: Severity, text: &str) {
        match severity {
            Severity::Trace => trace!("{text}"),
            Severity::Notice => info!("{text}"),
            Severity::Warning => warn!("{text}"),
            Severity::Failure => error!("{text}"),
        }
    }
}

/// Owns the progress table for one run and notifies the observer.
pub struct Tracker<'o, K: StepKey> {
    progress: Progress<K>,
    observer: &'o mut dyn Observer<K>,
}

impl<'o, K: StepKey> Tracker<'o, K> {
    /// Starts a run with every step pending.
    pub fn new(observer: &'o mut dyn Observer<K>) -> Self {
        Self {
            progress: Progress::new(),
            observer,
        }
    }

    /// Applies a transition and emits the full snapshot.
    pub fn transition(&mut self, key: K, status: StepStatus, reason: Option<String>) {
        self.progress.transition(key, status, reason);
        self.observer.progress(&self.progress);
    }

    /// Marks `key` as working.
    pub fn working(&mut self, key: K) {
        self.transition(key, StepStatus::Working, None);
    }

    /// Marks `key` as passed.
    pub fn pass(&mut self, key: K) {
        self.transition(key, StepStatus::Pass, None);
    }

    /// Marks `key` as skipped.
    pub fn skip(&mut self, key: K) {
        self.transition(key, StepStatus::Skipped, None);
    }

    /// Marks `key` as warned with `reason`.
    pub fn warn(&mut self, key: K, reason: impl Into<String>) {
        self.transition(key, StepStatus::Warn, Some(reason.into()));
    }

    /// Marks `key` as failed with `reason`; the run can no longer pass.
    pub fn fail(&mut self, key: K, reason: impl Into<String>) {
        self.transition(key, StepStatus::Fail, Some(reason.into()));
    }

    /// True once any step has failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.progress.has_failed()
    }

    /// Emits a message at `severity`.
    pub fn message(&mut self, severity: Severity, text: impl AsRef<str>) {
        self.observer.message(severity, text.as_ref());
    }

    /// Emits a trace message.
    pub fn trace(&mut self, text: impl AsRef<str>) {
        self.message(Severity::Trace, text);
    }

    /// Emits a notice message.
    pub fn notice(&mut self, text: impl AsRef<str>) {
        self.message(Severity::Notice, text);
    }

    /// Emits a warning message.
    pub fn warning(&mut self, text: impl AsRef<str>) {
        self.message(Severity::Warning, text);
    }

    /// Emits a failure message.
    pub fn failure(&mut self, text: impl AsRef<str>) {
        self.message(Severity::Failure, text);
    }

    /// The current table.
    #[must_use]
    pub fn progress(&self) -> &Progress<K> {
        &self.progress
    }

    /// Ends the run with a report.
    ///
    /// The run passes only when no step failed and `success` names what was
    /// verified; otherwise the reason cites the first failed step.
    #[must_use]
    pub fn conclude(self, success: Option<String>) -> Report<K> {
        let failure = self
            .progress
            .first_failure()
            .map(|step| format!("{}: {}", step.title(), step.reason().unwrap_or("failed")));
        let failed = self.progress.has_failed();
        match (failure, success) {
            (None, Some(reason)) if !failed => Report {
                success: true,
                reason,
                progress: self.progress,
            },
            (failure, _) => Report {
                success: false,
                reason: failure.unwrap_or_else(|| "verification did not complete".to_owned()),
                progress: self.progress,
            },
        }
    }
}

/// Executor decorator that journals commands for the observer.
///
/// Each command is recorded at [`Severity::Trace`]; a non-zero exit or an
/// executor error is recorded at [`Severity::Failure`] with the command's
/// output. Entries wait in the journal until [`CommandJournal::relay`] hands
/// them to a tracker.
pub struct CommandJournal<'a> {
    inner: &'a dyn CommandExecutor,
    entries: RefCell<Vec<(Severity, String)>>,
}

impl<'a> CommandJournal<'a> {
    /// Wraps `inner`.
    pub fn new(inner: &'a dyn CommandExecutor) -> Self {
        Self {
            inner,
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Sends every pending entry to `tracker`, oldest first.
    pub fn relay<K: StepKey>(&self, tracker: &mut Tracker<'_, K>) {
        for (severity, text) in self.entries.take() {
            tracker.message(severity, text);
        }
    }

    fn record(&self, severity: Severity, text: String) {
        self.entries.borrow_mut().push((severity, text));
    }
}

impl CommandExecutor for CommandJournal<'_> {
    fn run(&self, cwd: &Utf8Path, cmd: &str, args: &[&str]) -> Result<Output> {
        let line = command_line(cmd, args);
        self.record(Severity::Trace, format!("running `{line}` in {cwd}"));
        let result = self.inner.run(cwd, cmd, args);
        match &result {
            Ok(output) if !output.status.success() => {
                self.record(
                    Severity::Failure,
                    format!("`{line}` failed: {}", failure_text(output)),
                );
            }
            Err(err) => self.record(Severity::Failure, format!("`{line}` failed: {err}")),
            Ok(_) => {}
        }
        result
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<K> {
    /// True when every step passed, warned, or was skipped.
    pub success: bool,
    /// What was verified, or why verification failed.
    pub reason: String,
    /// The final progress table.
    pub progress: Progress<K>,
}
