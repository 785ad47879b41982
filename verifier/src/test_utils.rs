//! Test doubles shared by unit and integration tests.

use crate::engine::{Observer, Severity};
use crate::error::{Result, VerifyError};
use crate::exec::CommandExecutor;
use crate::progress::{Progress, StepKey};
use crate::registry::http::{HttpClient, HttpError};
use camino::{Utf8Path, Utf8PathBuf};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io::{Cursor, Read};
use std::process::{ExitStatus, Output};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a successful command `Output` with the given stdout and stderr.
#[must_use]
pub fn output_with(stdout: &str, stderr: &str) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Side effect run in the command's working directory before it "returns".
pub type Effect = Box<dyn Fn(&Utf8Path)>;

/// Represents an expected command invocation for testing.
pub struct ExpectedCall {
    /// The command to execute (e.g., "git").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: Result<Output>,
    /// Optional side effect, such as writing the tarball `npm pack` produces.
    pub effect: Option<Effect>,
}

impl ExpectedCall {
    /// Expects `cmd args…` and answers with `result`.
    #[must_use]
    pub fn new(cmd: &'static str, args: &[&str], result: Result<Output>) -> Self {
        Self {
            cmd,
            args: args.iter().map(|&arg| arg.to_owned()).collect(),
            result,
            effect: None,
        }
    }

    /// Runs `effect` in the working directory when the call is consumed.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn(&Utf8Path) + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }
}

impl fmt::Debug for ExpectedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpectedCall")
            .field("cmd", &self.cmd)
            .field("args", &self.args)
            .field("has_effect", &self.effect.is_some())
            .finish_non_exhaustive()
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Replays expected command invocations in order, returning predefined
/// results and recording the working directory of every call.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    seen: RefCell<Vec<(Utf8PathBuf, String)>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    /// Returns `(cwd, command line)` for every invocation so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<(Utf8PathBuf, String)> {
        self.seen.borrow().clone()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} remaining: {:?}",
            remaining.len(),
            remaining.front()
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cwd: &Utf8Path, cmd: &str, args: &[&str]) -> Result<Output> {
        let line = crate::exec::command_line(cmd, args);
        self.seen.borrow_mut().push((cwd.to_owned(), line.clone()));

        let Some(call) = self.expected.borrow_mut().pop_front() else {
            return Err(VerifyError::StubMismatch {
                message: format!("unexpected command `{line}`"),
            });
        };

        if call.cmd != cmd || call.args.iter().map(String::as_str).ne(args.iter().copied()) {
            return Err(VerifyError::StubMismatch {
                message: format!(
                    "expected `{}`, got `{line}`",
                    crate::exec::command_line(
                        call.cmd,
                        &call.args.iter().map(String::as_str).collect::<Vec<_>>()
                    )
                ),
            });
        }

        if let Some(effect) = &call.effect {
            effect(cwd);
        }
        call.result
    }
}

/// An in-memory `HttpClient` keyed by URL.
///
/// Unknown URLs answer with [`HttpError::NotFound`].
#[derive(Debug, Clone, Default)]
pub struct StubHttpClient {
    bodies: HashMap<String, Vec<u8>>,
}

impl StubHttpClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `url`.
    #[must_use]
    pub fn with_body(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.to_owned(), body.into());
        self
    }

    fn body(&self, url: &str) -> std::result::Result<&Vec<u8>, HttpError> {
        self.bodies.get(url).ok_or_else(|| HttpError::NotFound {
            url: url.to_owned(),
        })
    }
}

impl HttpClient for StubHttpClient {
    fn get_text(&self, url: &str) -> std::result::Result<String, HttpError> {
        let body = self.body(url)?;
        String::from_utf8(body.clone()).map_err(|err| HttpError::Request {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }

    fn open(&self, url: &str) -> std::result::Result<Box<dyn Read>, HttpError> {
        Ok(Box::new(Cursor::new(self.body(url)?.clone())))
    }
}

/// A reader that hands out at most one byte per `read` call.
///
/// Models network bodies that deliver data in small fragments.
#[derive(Debug)]
pub struct TrickleReader {
    inner: Cursor<Vec<u8>>,
}

impl TrickleReader {
    /// Wraps `bytes`.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            inner: Cursor::new(bytes.into()),
        }
    }
}

impl Read for TrickleReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let limit = buf.len().min(1);
        self.inner.read(&mut buf[..limit])
    }
}

/// An `Observer` that keeps every snapshot and message it receives.
#[derive(Debug)]
pub struct RecordingObserver<K: StepKey> {
    /// Every progress snapshot, in delivery order.
    pub snapshots: Vec<Progress<K>>,
    /// Every message, in delivery order.
    pub messages: Vec<(Severity, String)>,
}

impl<K: StepKey> Default for RecordingObserver<K> {
    fn default() -> Self {
        Self {
            snapshots: Vec::new(),
            messages: Vec::new(),
        }
    }
}

impl<K: StepKey> RecordingObserver<K> {
    /// Returns the messages recorded at `severity`.
    #[must_use]
    pub fn messages_at(&self, severity: Severity) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|(level, _)| *level == severity)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

impl<K: StepKey> Observer<K> for RecordingObserver<K> {
    fn progress(&mut self, snapshot: &Progress<K>) {
        self.snapshots.push(snapshot.clone());
    }

    fn message(&mut self, severity: Severity, text: &str) {
        self.messages.push((severity, text.to_owned()));
    }
}
