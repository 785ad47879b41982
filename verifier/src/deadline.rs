//! Run-wide deadline and cancellation token.
//!
//! Every blocking call in the pipeline (process execution, HTTP requests,
//! archive streaming) receives a [`Deadline`] so that an unreachable remote
//! cannot hang a run indefinitely. Clones share the cancellation flag.

use crate::error::{Result, VerifyError};
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// An optional expiry instant paired with a shared cancellation flag.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tbv::deadline::Deadline;
///
/// let deadline = Deadline::after(Duration::from_secs(60));
/// assert!(deadline.check().is_ok());
///
/// deadline.cancel();
/// assert!(deadline.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    /// A deadline that never expires on its own.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A deadline that expires `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Instant::now().checked_add(budget),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds a deadline from a number of seconds, where zero means unbounded.
    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            Self::unbounded()
        } else {
            Self::after(Duration::from_secs(secs))
        }
    }

    /// Requests cancellation of every operation sharing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Self::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Time left before expiry, or `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Returns the remaining time capped at `cap`.
    #[must_use]
    pub fn budget(&self, cap: Duration) -> Duration {
        self.remaining().map_or(cap, |left| left.min(cap))
    }

    /// Fails when the deadline has passed or the run was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Cancelled`] or [`VerifyError::DeadlineExceeded`].
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }
        if self.remaining().is_some_and(|left| left.is_zero()) {
            return Err(VerifyError::DeadlineExceeded);
        }
        Ok(())
    }
}

/// A reader that fails with [`io::ErrorKind::TimedOut`] once the deadline
/// passes or the run is cancelled.
#[derive(Debug)]
pub struct DeadlineReader<R> {
    inner: R,
    deadline: Deadline,
}

impl<R> DeadlineReader<R> {
    /// Wraps `inner` so every read first checks `deadline`.
    pub fn new(inner: R, deadline: Deadline) -> Self {
        Self { inner, deadline }
    }
}

impl<R: Read> Read for DeadlineReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Err(err) = self.deadline.check() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, err.to_string()));
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_has_no_remaining_time() {
        let deadline = Deadline::unbounded();
        assert!(deadline.remaining().is_none());
        assert_eq!(deadline.budget(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn zero_seconds_means_unbounded() {
        assert!(Deadline::from_secs(0).remaining().is_none());
        assert!(Deadline::from_secs(10).remaining().is_some());
    }

    #[test]
    fn expired_deadline_fails_check() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(matches!(deadline.check(), Err(VerifyError::DeadlineExceeded)));
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let deadline = Deadline::after(Duration::from_secs(600));
        let clone = deadline.clone();
        clone.cancel();
        assert!(deadline.is_cancelled());
        assert!(matches!(deadline.check(), Err(VerifyError::Cancelled)));
    }

    #[test]
    fn budget_is_capped_by_remaining_time() {
        let deadline = Deadline::after(Duration::from_secs(2));
        assert!(deadline.budget(Duration::from_secs(60)) <= Duration::from_secs(2));
    }

    #[test]
    fn deadline_reader_stops_after_cancel() {
        let deadline = Deadline::unbounded();
        let mut reader = DeadlineReader::new(&b"payload"[..], deadline.clone());
        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).expect("first read"), 3);

        deadline.cancel();
        let err = reader.read(&mut buf).expect_err("read after cancel");
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
