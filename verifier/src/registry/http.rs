//! HTTP access to the registry and published tarballs.
//!
//! Provides a trait-based abstraction so tests can serve canned bodies
//! without network access. The production client builds a `ureq` agent per
//! request whose timeout is the remaining run budget capped by the
//! configured per-request limit.

use crate::deadline::Deadline;
use log::debug;
use std::io::Read;
use std::time::Duration;

/// Upper bound on the size of a registry document read into memory.
const MAX_TEXT_BYTES: u64 = 256 * 1024 * 1024;

/// Default cap on a single HTTP request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches text documents and byte streams by URL.
#[cfg_attr(test, mockall::automock)]
pub trait HttpClient {
    /// Downloads `url` and returns the body as text.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::NotFound`] on a 404, [`HttpError::Io`] when the
    /// connection fails mid-transfer, otherwise [`HttpError::Request`].
    fn get_text(&self, url: &str) -> Result<String, HttpError>;

    /// Opens `url` as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::NotFound`] on a 404, [`HttpError::Io`] when the
    /// connection fails, otherwise [`HttpError::Request`].
    fn open(&self, url: &str) -> Result<Box<dyn Read>, HttpError>;
}

/// Errors arising from HTTP requests.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request failed.
    #[error("request failed for {url}: {reason}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered 404.
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error while reading a response.
    #[error("I/O error reading response: {0}")]
    Io(#[from] std::io::Error),
}

/// `ureq`-backed client bound to the run deadline.
#[derive(Debug, Clone)]
pub struct UreqHttpClient {
    deadline: Deadline,
    timeout: Duration,
}

impl UreqHttpClient {
    /// Creates a client whose requests never outlive `deadline` nor take
    /// longer than `timeout` each.
    #[must_use]
    pub fn new(deadline: Deadline, timeout: Duration) -> Self {
        Self { deadline, timeout }
    }

    fn agent(&self, url: &str) -> Result<ureq::Agent, HttpError> {
        self.deadline.check().map_err(|err| HttpError::Request {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(self.deadline.budget(self.timeout)))
            .build();
        Ok(ureq::Agent::new_with_config(config))
    }

    fn call(&self, url: &str) -> Result<ureq::http::Response<ureq::Body>, HttpError> {
        debug!("GET {url}");
        self.agent(url)?
            .get(url)
            .call()
            .map_err(|err| map_ureq_error(url, err))
    }
}

impl HttpClient for UreqHttpClient {
    fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let mut body = self.call(url)?.into_body();
        body.with_config()
            .limit(MAX_TEXT_BYTES)
            .read_to_string()
            .map_err(|err| map_ureq_error(url, err))
    }

    fn open(&self, url: &str) -> Result<Box<dyn Read>, HttpError> {
        Ok(Box::new(self.call(url)?.into_body().into_reader()))
    }
}

/// Map a ureq error to an [`HttpError`].
fn map_ureq_error(url: &str, err: ureq::Error) -> HttpError {
    match err {
        ureq::Error::StatusCode(404) => HttpError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::Io(io) => HttpError::Io(io),
        other => HttpError::Request {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
