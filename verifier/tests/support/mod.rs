//! Test support utilities for pipeline behavioural tests.
//!
//! Scripted command sequences for the stub executor and scratch directories
//! shared by the verify and local test scenarios.

use camino::Utf8PathBuf;
use tbv::test_utils::{ExpectedCall, output_with};
use tempfile::TempDir;

/// Repository URL the scenarios declare.
pub const REPO: &str = "https://example.test/example.git";

/// Commit the scenarios build from.
pub const COMMIT: &str = "abc1234def5678abc1234def5678abc1234def56";

/// Creates a temporary directory with a UTF-8 path.
pub fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    (dir, path)
}

/// The `--version` checks every run starts with.
pub fn version_calls() -> Vec<ExpectedCall> {
    vec![
        ExpectedCall::new("git", &["--version"], Ok(output_with("git version 2.45.0\n", ""))),
        ExpectedCall::new("npm", &["--version"], Ok(output_with("10.8.1\n", ""))),
    ]
}

/// A successful shallow checkout of `refspec` from [`REPO`].
pub fn checkout_calls(refspec: &'static str) -> Vec<ExpectedCall> {
    vec![
        ExpectedCall::new("git", &["init"], Ok(output_with("", ""))),
        ExpectedCall::new("git", &["remote", "add", "origin", REPO], Ok(output_with("", ""))),
        ExpectedCall::new(
            "git",
            &["fetch", "--depth", "1", "origin", refspec],
            Ok(output_with("", "")),
        ),
        ExpectedCall::new("git", &["checkout", "FETCH_HEAD"], Ok(output_with("", ""))),
    ]
}

/// What `npm pack` prints for an archive named `file` with `digest`.
pub fn pack_output(file: &str, digest: &str) -> std::process::Output {
    output_with(
        &format!("{file}\n"),
        &format!("npm notice filename: {file}\nnpm notice shasum: {digest}\n"),
    )
}
