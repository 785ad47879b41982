//! Content manifests and their differences.
//!
//! A manifest maps every archive-relative file path to the SHA-1 of its
//! bytes. Entries are hashed while the archive streams past, so neither
//! archive is ever held in memory. Two manifests are compared by path only;
//! entry order inside the archives is irrelevant.

use super::ArchiveError;
use super::decode::decompress;
use super::shasum::Shasum;
use crate::deadline::{Deadline, DeadlineReader};
use crate::registry::http::HttpClient;
use camino::Utf8Path;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::thread;

/// Path → digest table for one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ContentManifest(BTreeMap<String, Shasum>);

impl ContentManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `digest` for `path`, replacing any earlier entry.
    pub fn insert(&mut self, path: impl Into<String>, digest: Shasum) {
        self.0.insert(path.into(), digest);
    }

    /// Looks up the digest for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Shasum> {
        self.0.get(path)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the archive held no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(path, digest)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Shasum)> {
        self.0.iter().map(|(path, digest)| (path.as_str(), digest))
    }
}

impl FromIterator<(String, Shasum)> for ContentManifest {
    fn from_iter<I: IntoIterator<Item = (String, Shasum)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// File-level differences between two manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestDiff {
    /// Paths present only in the second manifest.
    pub added: BTreeSet<String>,
    /// Paths present in both with different digests.
    pub modified: BTreeSet<String>,
    /// Paths present only in the first manifest.
    pub removed: BTreeSet<String>,
}

impl ManifestDiff {
    /// True when the archives are content-identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Human-readable counts, e.g. `2 files added, 0 modified, 1 removed`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} files added, {} modified, {} removed",
            self.added.len(),
            self.modified.len(),
            self.removed.len()
        )
    }
}

/// Compares `before` against `after`.
///
/// # Examples
///
/// ```
/// use tbv::archive::manifest::{ContentManifest, diff};
/// use tbv::archive::shasum::Shasum;
///
/// let mut built = ContentManifest::new();
/// built.insert("package/index.js", Shasum::of_bytes(b"one"));
/// let mut published = built.clone();
/// published.insert("package/extra.js", Shasum::of_bytes(b"two"));
///
/// let changes = diff(&built, &published);
/// assert_eq!(changes.summary(), "1 files added, 0 modified, 0 removed");
/// ```
#[must_use]
pub fn diff(before: &ContentManifest, after: &ContentManifest) -> ManifestDiff {
    let mut changes = ManifestDiff::default();
    for (path, digest) in before.iter() {
        match after.get(path) {
            None => {
                changes.removed.insert(path.to_owned());
            }
            Some(other) if other != digest => {
                changes.modified.insert(path.to_owned());
            }
            Some(_) => {}
        }
    }
    for (path, _) in after.iter() {
        if before.get(path).is_none() {
            changes.added.insert(path.to_owned());
        }
    }
    changes
}

/// Streams `source` as an optionally compressed tar archive and hashes every
/// non-directory entry.
///
/// # Errors
///
/// Returns an error if decompression or tar parsing fails, or the deadline
/// passes mid-stream.
pub fn manifest_from_reader(
    source: Box<dyn Read + '_>,
    deadline: &Deadline,
) -> Result<ContentManifest, ArchiveError> {
    let guarded = DeadlineReader::new(source, deadline.clone());
    let plain = decompress(Box::new(guarded))?;
    let mut archive = tar::Archive::new(plain);
    let mut manifest = ContentManifest::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let digest = Shasum::of_reader(&mut entry)?;
        manifest.insert(path, digest);
    }

    Ok(manifest)
}

/// Builds the manifest of a local archive file.
///
/// # Errors
///
/// Returns [`ArchiveError::Open`] if the file cannot be opened, otherwise
/// the errors of [`manifest_from_reader`].
pub fn manifest_from_file(
    path: &Utf8Path,
    deadline: &Deadline,
) -> Result<ContentManifest, ArchiveError> {
    let file = std::fs::File::open(path).map_err(|err| ArchiveError::Open {
        location: path.to_string(),
        reason: err.to_string(),
    })?;
    manifest_from_reader(Box::new(file), deadline)
}

/// Builds the manifest of a remotely hosted archive.
///
/// # Errors
///
/// Returns [`ArchiveError::Open`] if the request fails, otherwise the errors
/// of [`manifest_from_reader`].
pub fn manifest_from_url(
    http: &dyn HttpClient,
    url: &str,
    deadline: &Deadline,
) -> Result<ContentManifest, ArchiveError> {
    let body = http.open(url).map_err(|err| ArchiveError::Open {
        location: url.to_owned(),
        reason: err.to_string(),
    })?;
    manifest_from_reader(body, deadline)
}

/// Manifests of both sides of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPair {
    /// Manifest of the locally built archive.
    pub built: ContentManifest,
    /// Manifest of the published archive.
    pub published: ContentManifest,
}

impl ManifestPair {
    /// Differences from the built archive to the published one.
    #[must_use]
    pub fn diff(&self) -> ManifestDiff {
        diff(&self.built, &self.published)
    }
}

/// Streams the local and remote archives concurrently and joins both.
///
/// The two workers share nothing mutable; each builds its own manifest. The
/// first error (local side first) is returned if either fails.
///
/// # Errors
///
/// Returns the first worker error, or [`ArchiveError::WorkerPanicked`].
pub fn fetch_manifests(
    http: &(dyn HttpClient + Sync),
    built: &Utf8Path,
    published_url: &str,
    deadline: &Deadline,
) -> Result<ManifestPair, ArchiveError> {
    thread::scope(|scope| {
        let local = scope.spawn(|| manifest_from_file(built, deadline));
        let remote = scope.spawn(|| manifest_from_url(http, published_url, deadline));

        let built_manifest = local.join().map_err(|_| ArchiveError::WorkerPanicked {
            location: built.to_string(),
        });
        let published_manifest = remote.join().map_err(|_| ArchiveError::WorkerPanicked {
            location: published_url.to_owned(),
        });

        Ok(ManifestPair {
            built: built_manifest??,
            published: published_manifest??,
        })
    })
}
