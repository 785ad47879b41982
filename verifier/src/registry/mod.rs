//! Registry resolution.
//!
//! Turns a package name and optional version into a [`PackageRecord`]: the
//! concrete version, its source repository, the commit it claims to be built
//! from, the declared archive digest, and where the archive is published.
//!
//! Failures are split in two: [`VerifyError::Resolution`] for problems with
//! the registry document itself and [`VerifyError::Repository`] for a
//! missing or unusable repository declaration.

pub mod http;
pub mod packument;

use crate::archive::shasum::Shasum;
use crate::error::{Result, VerifyError};
use http::HttpClient;
use log::{debug, warn};
use packument::{Packument, Repository, VersionInfo};

/// The public npm registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.com";

/// Dist-tag used when no version is requested.
const LATEST_TAG: &str = "latest";

/// Everything the later stages need to know about a published version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Package name as requested.
    pub package_name: String,
    /// Concrete version after dist-tag resolution.
    pub resolved_version: String,
    /// Clone URL with any `git+` prefix removed.
    pub repository_url: String,
    /// Commit the registry claims the version was built from.
    pub commit_hash: Option<String>,
    /// Digest of the published archive.
    pub declared_digest: Shasum,
    /// URL of the published archive.
    pub tarball_location: String,
}

/// Registry document URL for `name`, encoding the scope separator.
///
/// # Examples
///
/// ```
/// use tbv::registry::package_url;
///
/// assert_eq!(
///     package_url("https://registry.npmjs.com/", "@types/node"),
///     "https://registry.npmjs.com/@types%2Fnode"
/// );
/// ```
#[must_use]
pub fn package_url(registry_url: &str, name: &str) -> String {
    format!(
        "{}/{}",
        registry_url.trim_end_matches('/'),
        name.replace('/', "%2F")
    )
}

/// Resolves `name` at `version` (or the `latest` dist-tag) against the
/// registry at `registry_url`.
///
/// # Errors
///
/// Returns [`VerifyError::Resolution`] when the document cannot be fetched,
/// the version cannot be resolved, or its metadata, digest, or tarball is
/// missing. Returns [`VerifyError::Repository`] when the repository is
/// missing, not git, or has no URL; the repository is checked before the
/// digest and tarball.
pub fn resolve(
    http: &dyn HttpClient,
    registry_url: &str,
    name: &str,
    version: Option<&str>,
) -> Result<PackageRecord> {
    let packument = fetch_packument(http, registry_url, name)?;
    let resolved_version = resolve_version(&packument, version)?;
    let info = packument
        .versions
        .get(&resolved_version)
        .ok_or_else(|| VerifyError::Resolution {
            reason: format!("cannot find info for version {resolved_version}"),
        })?;

    let repository_url = repository_url(info, &resolved_version)?;
    let declared_digest = declared_digest(info, &resolved_version)?;
    let tarball_location = info
        .tarball()
        .ok_or_else(|| VerifyError::Resolution {
            reason: format!("tarball is not specified for version {resolved_version}"),
        })?
        .to_owned();

    Ok(PackageRecord {
        package_name: name.to_owned(),
        commit_hash: info.git_head.clone().filter(|head| !head.is_empty()),
        resolved_version,
        repository_url,
        declared_digest,
        tarball_location,
    })
}

fn fetch_packument(http: &dyn HttpClient, registry_url: &str, name: &str) -> Result<Packument> {
    let url = package_url(registry_url, name);
    let fetched = http
        .get_text(&url)
        .map_err(VerifyError::from)
        .and_then(|body| {
            serde_json::from_str::<Packument>(&body).map_err(|err| VerifyError::Parse {
                reason: err.to_string(),
            })
        });
    fetched.map_err(|err| {
        warn!("registry lookup for {name} failed: {err}");
        VerifyError::Resolution {
            reason: "error fetching package data from registry".to_owned(),
        }
    })
}

/// Maps a requested version or dist-tag to a concrete version.
fn resolve_version(packument: &Packument, requested: Option<&str>) -> Result<String> {
    let tag = requested.unwrap_or(LATEST_TAG);
    if let Some(version) = packument.dist_tags.get(tag) {
        debug!("dist-tag {tag} resolves to {version}");
        return Ok(version.clone());
    }
    requested
        .map(str::to_owned)
        .ok_or_else(|| VerifyError::Resolution {
            reason: format!("cannot resolve version {tag}"),
        })
}

fn declared_digest(info: &VersionInfo, version: &str) -> Result<Shasum> {
    let raw = info
        .declared_shasum()
        .ok_or_else(|| VerifyError::Resolution {
            reason: format!("shasum is not specified for version {version}"),
        })?;
    Shasum::try_from(raw).map_err(|err| VerifyError::Resolution {
        reason: format!("invalid shasum for version {version}: {err}"),
    })
}

fn repository_url(info: &VersionInfo, version: &str) -> Result<String> {
    let url = match &info.repository {
        None => {
            return Err(VerifyError::Repository {
                reason: format!("repository is not specified for version {version}"),
            });
        }
        Some(Repository::Detailed { kind, url }) => {
            if let Some(kind) = kind.as_deref().filter(|kind| *kind != "git") {
                return Err(VerifyError::Repository {
                    reason: format!("non-git repository ({kind}) specified for version {version}"),
                });
            }
            url.as_deref().unwrap_or_default().to_owned()
        }
        Some(Repository::Shorthand(shorthand)) => expand_shorthand(shorthand),
    };

    if url.trim().is_empty() {
        return Err(VerifyError::Repository {
            reason: format!("repository URL is not specified for version {version}"),
        });
    }
    Ok(strip_git_prefix(url.trim()).to_owned())
}

/// Removes the `git+` scheme prefix package managers add to clone URLs.
#[must_use]
pub fn strip_git_prefix(url: &str) -> &str {
    url.strip_prefix("git+").unwrap_or(url)
}

/// Expands `owner/repo` style shorthands to HTTPS clone URLs.
///
/// Anything that already looks like a URL is returned unchanged.
///
/// # Examples
///
/// ```
/// use tbv::registry::expand_shorthand;
///
/// assert_eq!(expand_shorthand("owner/repo"), "https://github.com/owner/repo.git");
/// assert_eq!(expand_shorthand("gitlab:owner/repo"), "https://gitlab.com/owner/repo.git");
/// ```
#[must_use]
pub fn expand_shorthand(shorthand: &str) -> String {
    if shorthand.contains("://") || shorthand.starts_with("git@") {
        return shorthand.to_owned();
    }
    let (host, path) = match shorthand.split_once(':') {
        Some(("github", path)) => ("github.com", path),
        Some(("gitlab", path)) => ("gitlab.com", path),
        Some(("bitbucket", path)) => ("bitbucket.org", path),
        Some(_) => return shorthand.to_owned(),
        None => ("github.com", shorthand),
    };
    format!("https://{host}/{}.git", path.trim_end_matches(".git"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StubHttpClient;
    use super::http::{HttpError, MockHttpClient};
    use rstest::{fixture, rstest};

    const REGISTRY: &str = "https://registry.example";
    const SHASUM: &str = "0123456789abcdef0123456789abcdef01234567";

    fn document(version_body: &str, tags: &str) -> String {
        format!(r#"{{ "dist-tags": {tags}, "versions": {{ "1.0.0": {version_body} }} }}"#)
    }

    fn complete_version() -> String {
        format!(
            r#"{{
                "repository": {{ "type": "git", "url": "git+https://example.test/example.git" }},
                "gitHead": "abc1234def",
                "dist": {{ "shasum": "{SHASUM}", "tarball": "{REGISTRY}/example/-/example-1.0.0.tgz" }}
            }}"#
        )
    }

    #[fixture]
    fn registry() -> StubHttpClient {
        StubHttpClient::new().with_body(
            &format!("{REGISTRY}/example"),
            document(&complete_version(), r#"{ "latest": "1.0.0" }"#),
        )
    }

    #[rstest]
    fn resolves_latest(registry: StubHttpClient) {
        let record = resolve(&registry, REGISTRY, "example", None).expect("record");
        assert_eq!(record.resolved_version, "1.0.0");
        assert_eq!(record.repository_url, "https://example.test/example.git");
        assert_eq!(record.commit_hash.as_deref(), Some("abc1234def"));
        assert_eq!(record.declared_digest.as_str(), SHASUM);
        assert!(record.tarball_location.ends_with("example-1.0.0.tgz"));
    }

    #[rstest]
    fn resolves_explicit_version(registry: StubHttpClient) {
        let record = resolve(&registry, REGISTRY, "example", Some("1.0.0")).expect("record");
        assert_eq!(record.resolved_version, "1.0.0");
    }

    #[rstest]
    fn unknown_version_has_no_info(registry: StubHttpClient) {
        let err = resolve(&registry, REGISTRY, "example", Some("2.0.0")).expect_err("missing");
        assert!(
            matches!(err, VerifyError::Resolution { ref reason } if reason == "cannot find info for version 2.0.0")
        );
    }

    #[test]
    fn fails_without_latest_or_version() {
        let http = StubHttpClient::new().with_body(
            &format!("{REGISTRY}/example"),
            document(&complete_version(), "{}"),
        );
        let err = resolve(&http, REGISTRY, "example", None).expect_err("unresolvable");
        assert!(
            matches!(err, VerifyError::Resolution { ref reason } if reason.starts_with("cannot resolve version"))
        );
    }

    #[test]
    fn network_failure_has_a_fixed_reason() {
        let mut http = MockHttpClient::new();
        http.expect_get_text().returning(|url| {
            Err(HttpError::Request {
                url: url.to_owned(),
                reason: "connection refused".to_owned(),
            })
        });
        let err = resolve(&http, REGISTRY, "example", None).expect_err("network");
        assert_eq!(err.to_string(), "error fetching package data from registry");
    }

    #[test]
    fn scoped_names_are_encoded_in_the_request() {
        let mut http = MockHttpClient::new();
        http.expect_get_text()
            .withf(|url| url == "https://registry.example/@scope%2Fpkg")
            .times(1)
            .returning(|url| Err(HttpError::NotFound { url: url.to_owned() }));
        let _ = resolve(&http, REGISTRY, "@scope/pkg", None);
    }

    #[rstest]
    #[case::missing(r#"{ "dist": { "shasum": "SHA", "tarball": "t" } }"#, "repository is not specified for version 1.0.0")]
    #[case::svn(r#"{ "repository": { "type": "svn", "url": "svn://x" }, "dist": { "shasum": "SHA", "tarball": "t" } }"#, "non-git repository (svn) specified for version 1.0.0")]
    #[case::no_url(r#"{ "repository": { "type": "git" }, "dist": { "shasum": "SHA", "tarball": "t" } }"#, "repository URL is not specified for version 1.0.0")]
    #[case::svn_without_dist(r#"{ "repository": { "type": "svn", "url": "svn://x" } }"#, "non-git repository (svn) specified for version 1.0.0")]
    #[case::missing_without_dist("{}", "repository is not specified for version 1.0.0")]
    fn repository_problems_are_repository_errors(#[case] body: &str, #[case] expected: &str) {
        let http = StubHttpClient::new().with_body(
            &format!("{REGISTRY}/example"),
            document(&body.replace("SHA", SHASUM), r#"{ "latest": "1.0.0" }"#),
        );
        let err = resolve(&http, REGISTRY, "example", None).expect_err("repository");
        assert!(matches!(err, VerifyError::Repository { ref reason } if reason == expected));
    }

    #[test]
    fn missing_git_head_is_not_an_error() {
        let body = complete_version().replace(r#""gitHead": "abc1234def","#, "");
        let http = StubHttpClient::new().with_body(
            &format!("{REGISTRY}/example"),
            document(&body, r#"{ "latest": "1.0.0" }"#),
        );
        let record = resolve(&http, REGISTRY, "example", None).expect("record");
        assert!(record.commit_hash.is_none());
    }

    #[test]
    fn malformed_shasum_is_a_resolution_error() {
        let body = complete_version().replace(SHASUM, "not-a-digest");
        let http = StubHttpClient::new().with_body(
            &format!("{REGISTRY}/example"),
            document(&body, r#"{ "latest": "1.0.0" }"#),
        );
        let err = resolve(&http, REGISTRY, "example", None).expect_err("shasum");
        assert!(matches!(err, VerifyError::Resolution { ref reason } if reason.starts_with("invalid shasum")));
    }

    #[rstest]
    #[case("owner/repo", "https://github.com/owner/repo.git")]
    #[case("github:owner/repo", "https://github.com/owner/repo.git")]
    #[case("bitbucket:owner/repo", "https://bitbucket.org/owner/repo.git")]
    #[case("https://example.test/r.git", "https://example.test/r.git")]
    fn expands_shorthands(#[case] shorthand: &str, #[case] expected: &str) {
        assert_eq!(expand_shorthand(shorthand), expected);
    }

    #[test]
    fn strips_git_plus_prefix() {
        assert_eq!(strip_git_prefix("git+ssh://git@x/y.git"), "ssh://git@x/y.git");
        assert_eq!(strip_git_prefix("https://x/y.git"), "https://x/y.git");
    }
}
