//! Error types for the package verifier.
//!
//! Variants follow the failure taxonomy of the verification pipeline:
//! resolution, repository, fetch, build, parse, and compare failures, plus
//! the plumbing errors (I/O, HTTP, archive streaming, deadlines) that the
//! stages convert into step reasons.

use crate::archive::ArchiveError;
use crate::registry::http::HttpError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while verifying a package.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The registry lookup or version resolution failed.
    #[error("{reason}")]
    Resolution {
        /// Description of why resolution failed.
        reason: String,
    },

    /// The repository reference is missing, unsupported, or unusable.
    #[error("{reason}")]
    Repository {
        /// Description of the repository problem.
        reason: String,
    },

    /// A shallow fetch sub-operation failed.
    #[error("{reason}")]
    Fetch {
        /// Which sub-operation failed and why.
        reason: String,
    },

    /// Packaging failed, including after the install-and-retry fallback.
    #[error("{reason}")]
    Build {
        /// Description of the build failure.
        reason: String,
    },

    /// An expected pattern was absent from tool output or an archive.
    #[error("{reason}")]
    Parse {
        /// Description of what could not be parsed.
        reason: String,
    },

    /// Two digests or manifests did not match.
    #[error("{reason}")]
    Compare {
        /// Description of the mismatch.
        reason: String,
    },

    /// An HTTP request failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Streaming or decoding an archive failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// An external command did not finish before the deadline.
    #[error("{program} timed out")]
    CommandTimedOut {
        /// The program that was killed.
        program: String,
    },

    /// The run deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The run was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration at {path}: {reason}")]
    Config {
        /// Path of the offending configuration file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

/// Result type alias using [`VerifyError`].
pub type Result<T> = std::result::Result<T, VerifyError>;
