//! Serde model of the registry's package document ("packument").
//!
//! Only the fields the verifier reads are modelled; everything else in the
//! document is ignored.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Top-level registry document for one package.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    /// Tag name → version, e.g. `latest` → `1.2.3`.
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    /// Version → metadata.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionInfo>,
}

/// Metadata for a single published version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionInfo {
    /// Declared source repository.
    #[serde(default)]
    pub repository: Option<Repository>,
    /// Commit the version was published from.
    #[serde(rename = "gitHead", default)]
    pub git_head: Option<String>,
    /// Legacy top-level digest.
    #[serde(rename = "_shasum", default)]
    pub shasum: Option<String>,
    /// Distribution details.
    #[serde(default)]
    pub dist: Option<Dist>,
}

impl VersionInfo {
    /// The declared archive digest: `_shasum`, else `dist.shasum`.
    #[must_use]
    pub fn declared_shasum(&self) -> Option<&str> {
        self.shasum
            .as_deref()
            .or_else(|| self.dist.as_ref().and_then(|dist| dist.shasum.as_deref()))
            .filter(|value| !value.is_empty())
    }

    /// Where the published archive can be downloaded.
    #[must_use]
    pub fn tarball(&self) -> Option<&str> {
        self.dist
            .as_ref()
            .and_then(|dist| dist.tarball.as_deref())
            .filter(|value| !value.is_empty())
    }
}

/// The `dist` object of a version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Dist {
    /// SHA-1 of the published archive.
    #[serde(default)]
    pub shasum: Option<String>,
    /// URL of the published archive.
    #[serde(default)]
    pub tarball: Option<String>,
}

/// A repository declaration, either an object or a shorthand string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Repository {
    /// `{ "type": "git", "url": "…" }`.
    Detailed {
        /// Version-control system name.
        #[serde(rename = "type", default)]
        kind: Option<String>,
        /// Clone URL.
        #[serde(default)]
        url: Option<String>,
    },
    /// `"owner/repo"`, `"github:owner/repo"`, or a bare URL.
    Shorthand(String),
}
