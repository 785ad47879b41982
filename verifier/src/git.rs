//! Git operations used by the shallow checkout.
//!
//! Every operation takes the repository directory explicitly and runs
//! through a [`CommandExecutor`], so the run deadline applies and tests can
//! script the exchange.

use crate::error::{Result, VerifyError};
use crate::exec::{CommandExecutor, failure_text};
use camino::Utf8Path;
use std::process::Output;

/// Thin wrapper around the `git` command line.
pub struct Git<'a> {
    executor: &'a dyn CommandExecutor,
    program: &'a str,
}

impl<'a> Git<'a> {
    /// Creates a wrapper invoking `program` through `executor`.
    pub fn new(executor: &'a dyn CommandExecutor, program: &'a str) -> Self {
        Self { executor, program }
    }

    /// Runs `git init` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if git exits unsuccessfully.
    pub fn init(&self, dir: &Utf8Path) -> Result<()> {
        self.run(dir, "init", &["init"]).map(drop)
    }

    /// Registers `url` as the `origin` remote.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if git exits unsuccessfully.
    pub fn add_remote(&self, dir: &Utf8Path, url: &str) -> Result<()> {
        self.run(dir, "remote add", &["remote", "add", "origin", url])
            .map(drop)
    }

    /// Fetches `refspec` from `origin` with a depth of one.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if git exits unsuccessfully.
    pub fn fetch_shallow(&self, dir: &Utf8Path, refspec: &str) -> Result<()> {
        self.run(dir, "fetch", &["fetch", "--depth", "1", "origin", refspec])
            .map(drop)
    }

    /// Checks out whatever the last fetch retrieved.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if git exits unsuccessfully.
    pub fn checkout_fetch_head(&self, dir: &Utf8Path) -> Result<()> {
        self.run(dir, "checkout", &["checkout", "FETCH_HEAD"])
            .map(drop)
    }

    /// Returns the commit `HEAD` points at.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Fetch`] if git fails or prints nothing.
    pub fn head_commit(&self, dir: &Utf8Path) -> Result<String> {
        let output = self.run(dir, "rev-parse", &["rev-parse", "HEAD"])?;
        let commit = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if commit.is_empty() {
            return Err(VerifyError::Fetch {
                reason: "git rev-parse printed no commit".to_owned(),
            });
        }
        Ok(commit)
    }

    fn run(&self, dir: &Utf8Path, operation: &str, args: &[&str]) -> Result<Output> {
        let output = self.executor.run(dir, self.program, args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(VerifyError::Fetch {
                reason: format!("git {operation} failed: {}", failure_text(&output)),
            })
        }
    }
}
