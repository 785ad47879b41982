//! Shallow source checkout at a commit or release tag.
//!
//! The checkout lives in a fresh temporary directory that is removed when the
//! [`Checkout`] is dropped. When the registry names a commit it is fetched
//! directly; otherwise, or when that commit is unreachable, the release tag
//! is tried as `tags/v<version>` and then `tags/<version>`.

use crate::error::{Result, VerifyError};
use crate::git::Git;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fmt;
use tempfile::TempDir;

/// Prefix of every temporary checkout directory.
const TEMP_PREFIX: &str = "tbv-";

/// The reference that was actually fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedRef {
    /// A commit hash.
    Commit(String),
    /// A tag refspec such as `tags/v1.0.0`.
    Tag(String),
}

impl fmt::Display for FetchedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit(commit) => f.write_str(short_commit(commit)),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

/// Abbreviates a commit hash to seven characters.
#[must_use]
pub fn short_commit(commit: &str) -> &str {
    commit.get(..7).unwrap_or(commit)
}

/// What to check out.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutRequest<'a> {
    /// Clone URL of the repository.
    pub repository_url: &'a str,
    /// Commit to fetch, if known.
    pub commit: Option<&'a str>,
    /// Version whose release tag may stand in for the commit.
    pub version: Option<&'a str>,
    /// Parent of the temporary directory; the system default when `None`.
    pub temp_root: Option<&'a Utf8Path>,
}

/// A shallow working copy owning its temporary directory.
#[derive(Debug)]
pub struct Checkout {
    dir: TempDir,
    working_directory: Utf8PathBuf,
    resolved_ref: FetchedRef,
    unreachable_commit: Option<String>,
}

impl Checkout {
    /// Root of the working copy.
    #[must_use]
    pub fn working_directory(&self) -> &Utf8Path {
        &self.working_directory
    }

    /// The commit or tag that was checked out.
    #[must_use]
    pub fn resolved_ref(&self) -> &FetchedRef {
        &self.resolved_ref
    }

    /// The requested commit when it could not be fetched and a tag was used.
    #[must_use]
    pub fn unreachable_commit(&self) -> Option<&str> {
        self.unreachable_commit.as_deref()
    }

    /// Deletes the working copy now rather than on drop.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be removed.
    pub fn close(self) -> Result<()> {
        self.dir.close().map_err(VerifyError::from)
    }
}

fn fetch_failure(reason: impl Into<String>) -> VerifyError {
    VerifyError::Fetch {
        reason: reason.into(),
    }
}

/// Names the failed sub-step when git itself reported the failure.
///
/// Timeouts, cancellation, and spawn errors are returned unchanged.
fn sub_step(reason: impl Into<String>) -> impl FnOnce(VerifyError) -> VerifyError {
    move |err| match err {
        VerifyError::Fetch { .. } => fetch_failure(reason),
        other => other,
    }
}

fn create_temp_dir(root: Option<&Utf8Path>) -> Result<(TempDir, Utf8PathBuf)> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    let dir = match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .map_err(|err| fetch_failure(format!("error creating temp directory: {err}")))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|path| fetch_failure(format!("temp directory {} is not UTF-8", path.display())))?;
    Ok((dir, path))
}

/// Fetches the tag for `version`, trying the `v`-prefixed form first.
fn fetch_release_tag(git: &Git<'_>, dir: &Utf8Path, version: &str) -> Result<FetchedRef> {
    let candidates = [format!("tags/v{version}"), format!("tags/{version}")];
    for refspec in &candidates {
        match git.fetch_shallow(dir, refspec) {
            Ok(()) => return Ok(FetchedRef::Tag(refspec.clone())),
            Err(err @ VerifyError::Fetch { .. }) => debug!("fetching {refspec} failed: {err}"),
            Err(err) => return Err(err),
        }
    }
    Err(fetch_failure(format!(
        "unable to fetch tag from remote ({} or {})",
        candidates[0], candidates[1]
    )))
}

/// Creates a temporary directory and shallow-checks-out `request` into it.
///
/// # Errors
///
/// Returns [`VerifyError::Fetch`] naming the sub-operation that failed:
/// temp-dir creation, `git init`, adding the remote, fetching the commit
/// (when no tag fallback is possible), fetching both tag forms, or checking
/// out `FETCH_HEAD`. Executor errors such as [`VerifyError::CommandTimedOut`]
/// and [`VerifyError::Cancelled`] are returned as they are and stop any
/// further fetch attempts. The temporary directory is removed on every error
/// path.
pub fn shallow_checkout(git: &Git<'_>, request: &CheckoutRequest<'_>) -> Result<Checkout> {
    let (dir, path) = create_temp_dir(request.temp_root)?;
    debug!("checking out {} into {path}", request.repository_url);

    git.init(&path)
        .map_err(sub_step("error initializing git repo in temp directory"))?;
    git.add_remote(&path, request.repository_url)
        .map_err(sub_step(format!("error adding remote {}", request.repository_url)))?;

    let mut unreachable_commit = None;
    let resolved_ref = match (request.commit, request.version) {
        (Some(commit), version) => match git.fetch_shallow(&path, commit) {
            Ok(()) => FetchedRef::Commit(commit.to_owned()),
            Err(err @ VerifyError::Fetch { .. }) => {
                let Some(version) = version else {
                    debug!("fetching {commit} failed: {err}");
                    return Err(fetch_failure(format!(
                        "unable to fetch commit from remote ({})",
                        short_commit(commit)
                    )));
                };
                debug!("fetching {commit} failed: {err}");
                unreachable_commit = Some(commit.to_owned());
                fetch_release_tag(git, &path, version)?
            }
            Err(err) => return Err(err),
        },
        (None, Some(version)) => fetch_release_tag(git, &path, version)?,
        (None, None) => return Err(fetch_failure("no commit or version to fetch")),
    };

    git.checkout_fetch_head(&path)
        .map_err(sub_step("unable to checkout FETCH_HEAD"))?;

    Ok(Checkout {
        dir,
        working_directory: path,
        resolved_ref,
        unreachable_commit,
    })
}
