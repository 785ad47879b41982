//! Package archive inspection.
//!
//! Streams (optionally compressed) tar archives, hashes every entry, and
//! compares the resulting path → digest manifests.
//!
//! # Modules
//!
//! - [`decode`] - compression sniffing with a bounded layer depth
//! - [`manifest`] - content manifests, diffs, and concurrent comparison
//! - [`shasum`] - validated SHA-1 digest newtype

pub mod decode;
pub mod manifest;
pub mod shasum;

/// Errors arising while streaming an archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Reading or decoding the stream failed.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// More compression layers than [`decode::MAX_COMPRESSION_LAYERS`].
    #[error("archive is wrapped in more than {limit} compression layers")]
    TooManyLayers {
        /// The configured layer limit.
        limit: usize,
    },

    /// The archive could not be fetched.
    #[error("could not open archive {location}: {reason}")]
    Open {
        /// Path or URL of the archive.
        location: String,
        /// Description of the failure.
        reason: String,
    },

    /// One of the concurrent manifest workers panicked.
    #[error("manifest worker for {location} panicked")]
    WorkerPanicked {
        /// Path or URL the worker was reading.
        location: String,
    },
}
