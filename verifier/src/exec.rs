//! External command execution.
//!
//! Commands always run in an explicit working directory; the process-wide
//! current directory is never changed. The system executor enforces the run
//! [`Deadline`], killing the child when it expires or the run is cancelled.

use crate::deadline::Deadline;
use crate::error::{Result, VerifyError};
use camino::Utf8Path;
use log::{debug, trace};
use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use wait_timeout::ChildExt;

/// Interval between deadline and cancellation checks while a child runs.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Runs `cmd` with `args` inside `cwd` and returns the captured output.
    ///
    /// A non-zero exit status is not an error at this level; callers inspect
    /// [`Output::status`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned, times out, or the
    /// run is cancelled.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use tbv::deadline::Deadline;
    /// use tbv::exec::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor::new(Deadline::unbounded());
    /// let output = executor.run(Utf8Path::new("."), "git", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), tbv::error::VerifyError>(())
    /// ```
    fn run<'a>(&self, cwd: &Utf8Path, cmd: &str, args: &[&'a str]) -> Result<Output>;
}

/// Executes commands on the host system under a deadline.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor {
    deadline: Deadline,
}

impl SystemCommandExecutor {
    /// Creates an executor bound to `deadline`.
    #[must_use]
    pub fn new(deadline: Deadline) -> Self {
        Self { deadline }
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cwd: &Utf8Path, cmd: &str, args: &[&str]) -> Result<Output> {
        self.deadline.check()?;
        debug!("running `{}` in {cwd}", command_line(cmd, args));

        let mut child = Command::new(cmd)
            .args(args)
            .current_dir(cwd.as_std_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes concurrently so a chatty child cannot block on a
        // full pipe while we wait for it to exit.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, &self.deadline) {
            Ok(status) => status,
            Err(err) => {
                kill(&mut child);
                return Err(match err {
                    VerifyError::DeadlineExceeded => VerifyError::CommandTimedOut {
                        program: cmd.to_owned(),
                    },
                    other => other,
                });
            }
        };

        let output = Output {
            status,
            stdout: join_drain(stdout)?,
            stderr: join_drain(stderr)?,
        };
        trace!("{}", String::from_utf8_lossy(&output.stdout));
        if !output.stderr.is_empty() {
            trace!("{}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(output)
    }
}

/// Polls the child until it exits, the deadline passes, or the run is
/// cancelled.
fn wait_with_deadline(
    child: &mut Child,
    deadline: &Deadline,
) -> Result<std::process::ExitStatus> {
    loop {
        deadline.check()?;
        if let Some(status) = child.wait_timeout(deadline.budget(POLL_INTERVAL))? {
            return Ok(status);
        }
    }
}

fn kill(child: &mut Child) {
    if child.kill().is_err() {
        // The child may already have exited between the check and the kill.
    }
    if child.wait().is_err() {
        // Nothing further to reap.
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = pipe {
            reader.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_drain(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| VerifyError::Io(std::io::Error::other("output reader thread panicked")))?
        .map_err(VerifyError::from)
}

/// Runs `program --version` in `dir` and returns the first line it prints.
///
/// # Errors
///
/// Returns an error if the program cannot be run or exits unsuccessfully.
pub fn tool_version(executor: &dyn CommandExecutor, dir: &Utf8Path, program: &str) -> Result<String> {
    let output = executor.run(dir, program, &["--version"])?;
    if !output.status.success() {
        return Err(VerifyError::Io(std::io::Error::other(failure_text(&output))));
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_owned())
}

/// Formats a command and its arguments for display.
#[must_use]
pub fn command_line(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns stdout followed by stderr as lossy UTF-8.
#[must_use]
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Returns the trimmed stderr of a failed command, falling back to stdout
/// when stderr is empty.
#[must_use]
pub fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let text = if stderr.trim().is_empty() {
        String::from_utf8_lossy(&output.stdout)
    } else {
        stderr
    };
    text.trim().to_owned()
}
