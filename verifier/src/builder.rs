//! Package archive building.
//!
//! Runs the package manager's pack command in a checkout. A first pack
//! failure is taken to mean dependencies are missing: the install command
//! runs and packing is retried exactly once. The archive digest is scraped
//! from the tool's output with a narrowly scoped pattern.

use crate::archive::shasum::Shasum;
use crate::error::{Result, VerifyError};
use crate::exec::{CommandExecutor, combined_output, failure_text};
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use regex::Regex;
use std::process::Output;

/// Matches the digest line printed by `npm pack`.
pub const DIGEST_PATTERN: &str = r"shasum:\s+([0-9a-f]{40})";

/// Progress of the optional install sub-step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// Packing worked first time; no install was needed.
    InstallSkipped,
    /// Packing failed; dependencies are being installed.
    InstallStarted,
    /// Dependencies installed; packing is being retried.
    InstallPassed,
    /// Installing dependencies failed with the given reason.
    InstallFailed(String),
}

/// How to invoke the package manager.
#[derive(Debug, Clone, Copy)]
pub struct PackCommand<'a> {
    /// Package manager executable.
    pub program: &'a str,
    /// Arguments that produce the archive.
    pub pack_args: &'a [String],
    /// Arguments that install dependencies; `None` disables the retry.
    pub install_args: Option<&'a [String]>,
}

/// A successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPackage {
    /// Digest the packaging tool reported.
    pub digest: Shasum,
    /// File name the tool reported, relative to the build directory.
    pub artifact_name: Option<String>,
}

impl BuiltPackage {
    /// Absolute path of the produced archive inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Parse`] if the tool did not name its output.
    pub fn artifact_path(&self, dir: &Utf8Path) -> Result<Utf8PathBuf> {
        self.artifact_name
            .as_deref()
            .map(|name| dir.join(name))
            .ok_or_else(|| VerifyError::Parse {
                reason: "could not determine package file from build output".to_owned(),
            })
    }
}

/// Extracts the archive digest from tool output.
///
/// # Errors
///
/// Returns [`VerifyError::Parse`] if no digest line is present.
///
/// # Examples
///
/// ```
/// use tbv::builder::parse_digest;
///
/// let out = "npm notice shasum:        0123456789abcdef0123456789abcdef01234567\n";
/// assert_eq!(parse_digest(out)?.short(), "0123456");
/// # Ok::<(), tbv::error::VerifyError>(())
/// ```
pub fn parse_digest(output: &str) -> Result<Shasum> {
    let pattern = Regex::new(DIGEST_PATTERN).map_err(|err| VerifyError::Parse {
        reason: err.to_string(),
    })?;
    let digest = pattern
        .captures(output)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| VerifyError::Parse {
            reason: "could not parse digest from build output".to_owned(),
        })?;
    Shasum::try_from(digest.as_str())
}

/// The last non-empty line of stdout, which `npm pack` uses for the file
/// name.
fn artifact_name(output: &Output) -> Option<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}

/// Runs packaging commands in a directory.
pub struct ArchiveBuilder<'a> {
    executor: &'a dyn CommandExecutor,
    command: PackCommand<'a>,
}

impl<'a> ArchiveBuilder<'a> {
    /// Creates a builder running `command` through `executor`.
    pub fn new(executor: &'a dyn CommandExecutor, command: PackCommand<'a>) -> Self {
        Self { executor, command }
    }

    /// Packs `dir`, installing dependencies and retrying once if needed.
    ///
    /// `on_event` hears about the install sub-step so callers can track it.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Build`] if packing fails (after the retry, when
    /// one is configured) or installing fails, and [`VerifyError::Parse`] if
    /// the output carries no digest.
    pub fn build(
        &self,
        dir: &Utf8Path,
        on_event: &mut dyn FnMut(BuildEvent),
    ) -> Result<BuiltPackage> {
        let first = self.pack(dir)?;
        let output = if first.status.success() {
            on_event(BuildEvent::InstallSkipped);
            first
        } else {
            let Some(install_args) = self.command.install_args else {
                return Err(VerifyError::Build {
                    reason: format!("error creating package: {}", failure_text(&first)),
                });
            };
            debug!("pack failed in {dir}, installing dependencies");
            on_event(BuildEvent::InstallStarted);
            if let Err(err) = self.install(dir, install_args) {
                on_event(BuildEvent::InstallFailed(err.to_string()));
                return Err(err);
            }
            on_event(BuildEvent::InstallPassed);

            let retry = self.pack(dir)?;
            if !retry.status.success() {
                return Err(VerifyError::Build {
                    reason: format!(
                        "error creating package after installing dependencies: {}",
                        failure_text(&retry)
                    ),
                });
            }
            retry
        };

        Ok(BuiltPackage {
            digest: parse_digest(&combined_output(&output))?,
            artifact_name: artifact_name(&output),
        })
    }

    fn pack(&self, dir: &Utf8Path) -> Result<Output> {
        let args: Vec<&str> = self.command.pack_args.iter().map(String::as_str).collect();
        self.executor.run(dir, self.command.program, &args)
    }

    fn install(&self, dir: &Utf8Path, install_args: &[String]) -> Result<()> {
        let args: Vec<&str> = install_args.iter().map(String::as_str).collect();
        let output = self.executor.run(dir, self.command.program, &args)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(VerifyError::Build {
                reason: format!("error installing dependencies: {}", failure_text(&output)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandExecutor;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, output_with};
    use mockall::Sequence;
    use rstest::{fixture, rstest};

    const DIGEST: &str = "0123456789abcdef0123456789abcdef01234567";

    struct Args {
        pack: Vec<String>,
        install: Vec<String>,
    }

    #[fixture]
    fn args() -> Args {
        Args {
            pack: vec!["pack".to_owned(), "--unsafe-perm".to_owned()],
            install: vec!["ci".to_owned()],
        }
    }

    fn packed() -> Output {
        output_with(
            "example-1.0.0.tgz\n",
            &format!("npm notice name: example\nnpm notice shasum:  {DIGEST}\n"),
        )
    }

    fn collect(builder: &ArchiveBuilder<'_>, dir: &Utf8Path) -> (Result<BuiltPackage>, Vec<BuildEvent>) {
        let mut events = Vec::new();
        let result = builder.build(dir, &mut |event| events.push(event));
        (result, events)
    }

    #[rstest]
    fn first_pack_success_skips_install(args: Args) {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "npm",
            &["pack", "--unsafe-perm"],
            Ok(packed()),
        )]);
        let builder = ArchiveBuilder::new(
            &executor,
            PackCommand {
                program: "npm",
                pack_args: &args.pack,
                install_args: Some(&args.install),
            },
        );

        let (result, events) = collect(&builder, Utf8Path::new("/work"));
        let built = result.expect("built");

        assert_eq!(events, [BuildEvent::InstallSkipped]);
        assert_eq!(built.digest.as_str(), DIGEST);
        assert_eq!(
            built.artifact_path(Utf8Path::new("/work")).expect("artifact"),
            Utf8PathBuf::from("/work/example-1.0.0.tgz")
        );
    }

    #[rstest]
    fn installs_and_retries_once(args: Args) {
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_run()
            .withf(|_, cmd, args| cmd == "npm" && args.first() == Some(&"pack"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(failure_output("sh: tsc: command not found")));
        executor
            .expect_run()
            .withf(|_, _, args| args == ["ci"])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(output_with("added 12 packages", "")));
        executor
            .expect_run()
            .withf(|_, _, args| args.first() == Some(&"pack"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(packed()));

        let builder = ArchiveBuilder::new(
            &executor,
            PackCommand {
                program: "npm",
                pack_args: &args.pack,
                install_args: Some(&args.install),
            },
        );
        let (result, events) = collect(&builder, Utf8Path::new("/work"));

        assert!(result.is_ok());
        assert_eq!(events, [BuildEvent::InstallStarted, BuildEvent::InstallPassed]);
    }

    #[rstest]
    fn install_failure_is_reported(args: Args) {
        let executor = StubExecutor::new(vec![
            ExpectedCall::new("npm", &["pack", "--unsafe-perm"], Ok(failure_output("missing dep"))),
            ExpectedCall::new("npm", &["ci"], Ok(failure_output("lockfile out of date"))),
        ]);
        let builder = ArchiveBuilder::new(
            &executor,
            PackCommand {
                program: "npm",
                pack_args: &args.pack,
                install_args: Some(&args.install),
            },
        );

        let (result, events) = collect(&builder, Utf8Path::new("/work"));

        executor.assert_finished();
        assert!(matches!(result, Err(VerifyError::Build { ref reason }) if reason.contains("lockfile")));
        assert!(matches!(events.last(), Some(BuildEvent::InstallFailed(_))));
    }

    #[rstest]
    fn retry_happens_only_once(args: Args) {
        let executor = StubExecutor::new(vec![
            ExpectedCall::new("npm", &["pack", "--unsafe-perm"], Ok(failure_output("first"))),
            ExpectedCall::new("npm", &["ci"], Ok(output_with("", ""))),
            ExpectedCall::new("npm", &["pack", "--unsafe-perm"], Ok(failure_output("second"))),
        ]);
        let builder = ArchiveBuilder::new(
            &executor,
            PackCommand {
                program: "npm",
                pack_args: &args.pack,
                install_args: Some(&args.install),
            },
        );

        let (result, _) = collect(&builder, Utf8Path::new("/work"));

        executor.assert_finished();
        assert!(matches!(result, Err(VerifyError::Build { ref reason }) if reason.contains("second")));
    }

    #[test]
    fn without_install_args_the_first_failure_is_final() {
        let pack = vec!["pack".to_owned(), "--dry-run".to_owned()];
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "npm",
            &["pack", "--dry-run"],
            Ok(failure_output("ENOENT package.json")),
        )]);
        let builder = ArchiveBuilder::new(
            &executor,
            PackCommand {
                program: "npm",
                pack_args: &pack,
                install_args: None,
            },
        );

        let (result, events) = collect(&builder, Utf8Path::new("/work"));

        executor.assert_finished();
        assert!(matches!(result, Err(VerifyError::Build { .. })));
        assert!(events.is_empty());
    }

    #[rstest]
    fn missing_digest_is_a_parse_error(args: Args) {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "npm",
            &["pack", "--unsafe-perm"],
            Ok(output_with("example-1.0.0.tgz\n", "npm notice no digest here")),
        )]);
        let builder = ArchiveBuilder::new(
            &executor,
            PackCommand {
                program: "npm",
                pack_args: &args.pack,
                install_args: Some(&args.install),
            },
        );

        let (result, _) = collect(&builder, Utf8Path::new("/work"));
        assert!(matches!(
            result,
            Err(VerifyError::Parse { ref reason }) if reason == "could not parse digest from build output"
        ));
    }

    #[rstest]
    #[case::npm_notice(&format!("npm notice shasum:   {DIGEST}"), true)]
    #[case::uppercase(&format!("SHASUM: {DIGEST}"), false)]
    #[case::integrity_only("npm notice integrity: sha512-abc", false)]
    fn digest_pattern_is_narrow(#[case] text: &str, #[case] found: bool) {
        assert_eq!(parse_digest(text).is_ok(), found);
    }

    #[test]
    fn artifact_is_last_non_empty_stdout_line() {
        let output = output_with("> prepack\nbuilding\nexample-1.0.0.tgz\n\n", "");
        assert_eq!(artifact_name(&output).as_deref(), Some("example-1.0.0.tgz"));
        assert_eq!(artifact_name(&output_with("", "")), None);
    }
}
