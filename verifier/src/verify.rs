//! The registry verification pipeline.
//!
//! Resolves a published version, checks out the source it claims to come
//! from, packs that source, and compares the result file by file with the
//! archive the registry serves. Each stage converts its own errors into a
//! failed step and the run stops at the first failure. Commands run through
//! a [`CommandJournal`], so the observer sees each command line and the
//! output of any command that failed.

use crate::archive::manifest::fetch_manifests;
use crate::builder::{ArchiveBuilder, BuildEvent, PackCommand};
use crate::checkout::{Checkout, CheckoutRequest, short_commit, shallow_checkout};
use crate::config::Settings;
use crate::deadline::Deadline;
use crate::engine::{CommandJournal, Observer, Report, Tracker};
use crate::error::VerifyError;
use crate::exec::{CommandExecutor, tool_version};
use crate::git::Git;
use crate::package_spec::PackageSpec;
use crate::progress::{StepKey, StepStatus};
use crate::registry::http::HttpClient;
use crate::registry::{PackageRecord, resolve};
use camino::{Utf8Path, Utf8PathBuf};

/// Steps of the verification pipeline, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyStep {
    /// Fetch package data from the registry.
    Registry,
    /// The version declares a git repository URL.
    Repo,
    /// The version declares the commit it was built from.
    GitHead,
    /// Shallow checkout of that commit or tag.
    Checkout,
    /// Install dependencies when packing needs them.
    Install,
    /// Pack the checkout.
    Pack,
    /// Compare built and published contents.
    Compare,
}

impl StepKey for VerifyStep {
    const ALL: &'static [Self] = &[
        Self::Registry,
        Self::Repo,
        Self::GitHead,
        Self::Checkout,
        Self::Install,
        Self::Pack,
        Self::Compare,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Repo => "repo",
            Self::GitHead => "gitHead",
            Self::Checkout => "checkout",
            Self::Install => "install",
            Self::Pack => "pack",
            Self::Compare => "compare",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Registry => "Fetch package data from registry",
            Self::Repo => "Version contains repository URL",
            Self::GitHead => "Version contains gitHead",
            Self::Checkout => "Shallow checkout",
            Self::Install => "Install npm packages",
            Self::Pack => "Create package",
            Self::Compare => "Compare package contents",
        }
    }
}

/// External services a verification run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Runs git and the package manager.
    pub executor: &'a dyn CommandExecutor,
    /// Reaches the registry and tarball host.
    pub http: &'a (dyn HttpClient + Sync),
    /// Bounds the whole run.
    pub deadline: &'a Deadline,
}

/// Drives one verification run.
pub struct Verifier<'a> {
    collaborators: Collaborators<'a>,
    journal: CommandJournal<'a>,
    settings: &'a Settings,
}

/// The built archive and its location.
struct Packed {
    path: Utf8PathBuf,
}

impl<'a> Verifier<'a> {
    /// Creates a verifier using `collaborators` under `settings`.
    #[must_use]
    pub fn new(collaborators: Collaborators<'a>, settings: &'a Settings) -> Self {
        Self {
            collaborators,
            journal: CommandJournal::new(collaborators.executor),
            settings,
        }
    }

    /// Verifies `package`, reporting progress to `observer`.
    ///
    /// Never returns an error: every failure becomes a failed step and the
    /// report's reason.
    pub fn verify(
        &self,
        package: &PackageSpec,
        observer: &mut dyn Observer<VerifyStep>,
    ) -> Report<VerifyStep> {
        let mut tracker = Tracker::new(observer);
        self.report_tool_versions(&mut tracker);

        let Some(record) = self.resolve(&mut tracker, package) else {
            return tracker.conclude(None);
        };
        let Some(checkout) = self.checkout(&mut tracker, &record) else {
            return tracker.conclude(None);
        };
        let Some(packed) = self.pack(&mut tracker, &record, checkout.working_directory()) else {
            return tracker.conclude(None);
        };
        if !self.compare(&mut tracker, &record, &packed) {
            return tracker.conclude(None);
        }

        let verified = format!(
            "{}@{} matches code at {} ({})",
            record.package_name,
            record.resolved_version,
            record.repository_url,
            checkout.resolved_ref()
        );
        if let Err(err) = checkout.close() {
            tracker.warning(format!("could not remove checkout: {err}"));
        }
        tracker.conclude(Some(verified))
    }

    fn scratch_dir(&self) -> Utf8PathBuf {
        self.settings
            .temp_root
            .clone()
            .or_else(|| Utf8PathBuf::from_path_buf(std::env::temp_dir()).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    }

    fn report_tool_versions(&self, tracker: &mut Tracker<'_, VerifyStep>) {
        let dir = self.scratch_dir();
        for program in [
            self.settings.git.program.as_str(),
            self.settings.package_manager.program.as_str(),
        ] {
            match tool_version(self.collaborators.executor, &dir, program) {
                Ok(version) => tracker.trace(format!("{program} --version: {version}")),
                Err(err) => tracker.warning(format!("could not determine {program} version: {err}")),
            }
        }
    }

    /// Fails `step` if the run is out of time.
    fn gate(&self, tracker: &mut Tracker<'_, VerifyStep>, step: VerifyStep) -> bool {
        tracker.working(step);
        match self.collaborators.deadline.check() {
            Ok(()) => true,
            Err(err) => {
                tracker.fail(step, err.to_string());
                false
            }
        }
    }

    fn resolve(
        &self,
        tracker: &mut Tracker<'_, VerifyStep>,
        package: &PackageSpec,
    ) -> Option<PackageRecord> {
        if !self.gate(tracker, VerifyStep::Registry) {
            return None;
        }
        let resolved = resolve(
            self.collaborators.http,
            &self.settings.registry_url,
            &package.name,
            package.version.as_deref(),
        );
        let record = match resolved {
            Ok(record) => record,
            Err(err @ VerifyError::Repository { .. }) => {
                tracker.pass(VerifyStep::Registry);
                tracker.working(VerifyStep::Repo);
                tracker.fail(VerifyStep::Repo, err.to_string());
                return None;
            }
            Err(err) => {
                tracker.fail(VerifyStep::Registry, err.to_string());
                return None;
            }
        };

        tracker.pass(VerifyStep::Registry);
        tracker.notice(format!(
            "resolved {}@{} from {}",
            record.package_name, record.resolved_version, record.repository_url
        ));
        tracker.working(VerifyStep::Repo);
        tracker.pass(VerifyStep::Repo);
        tracker.working(VerifyStep::GitHead);
        match &record.commit_hash {
            Some(commit) => {
                tracker.trace(format!("gitHead {commit}"));
                tracker.pass(VerifyStep::GitHead);
            }
            None => {
                let reason = format!(
                    "gitHead is not specified for version {}",
                    record.resolved_version
                );
                tracker.warning(&reason);
                tracker.warn(VerifyStep::GitHead, reason);
            }
        }
        Some(record)
    }

    fn checkout(
        &self,
        tracker: &mut Tracker<'_, VerifyStep>,
        record: &PackageRecord,
    ) -> Option<Checkout> {
        if !self.gate(tracker, VerifyStep::Checkout) {
            return None;
        }
        let git = Git::new(&self.journal, &self.settings.git.program);
        let request = CheckoutRequest {
            repository_url: &record.repository_url,
            commit: record.commit_hash.as_deref(),
            version: Some(&record.resolved_version),
            temp_root: self.settings.temp_root.as_deref(),
        };
        let checked_out = shallow_checkout(&git, &request);
        self.journal.relay(tracker);
        match checked_out {
            Ok(checkout) => {
                if let Some(commit) = checkout.unreachable_commit() {
                    tracker.warning(format!(
                        "commit {} could not be fetched, checked out {} instead",
                        short_commit(commit),
                        checkout.resolved_ref()
                    ));
                }
                tracker.trace(format!("checked out into {}", checkout.working_directory()));
                tracker.pass(VerifyStep::Checkout);
                Some(checkout)
            }
            Err(err) => {
                tracker.fail(VerifyStep::Checkout, err.to_string());
                None
            }
        }
    }

    fn pack(
        &self,
        tracker: &mut Tracker<'_, VerifyStep>,
        record: &PackageRecord,
        dir: &Utf8Path,
    ) -> Option<Packed> {
        if !self.gate(tracker, VerifyStep::Pack) {
            return None;
        }
        let manager = &self.settings.package_manager;
        let builder = ArchiveBuilder::new(
            &self.journal,
            PackCommand {
                program: &manager.program,
                pack_args: &manager.pack_args,
                install_args: Some(&manager.install_args),
            },
        );
        let built = builder.build(dir, &mut |event| {
            track_install(tracker, event, VerifyStep::Install, VerifyStep::Pack);
        });
        self.journal.relay(tracker);
        let packed = built.and_then(|built| {
            let path = built.artifact_path(dir)?;
            Ok((built, path))
        });

        match packed {
            Ok((built, path)) => {
                if built.digest == record.declared_digest {
                    tracker.notice(format!("built shasum matches declared shasum {}", built.digest));
                } else {
                    tracker.notice(format!(
                        "built shasum {} differs from declared shasum {}; comparing contents",
                        built.digest, record.declared_digest
                    ));
                }
                tracker.pass(VerifyStep::Pack);
                Some(Packed { path })
            }
            Err(err) => {
                if tracker.progress().status(VerifyStep::Install) != StepStatus::Fail {
                    tracker.fail(VerifyStep::Pack, err.to_string());
                }
                None
            }
        }
    }

    fn compare(
        &self,
        tracker: &mut Tracker<'_, VerifyStep>,
        record: &PackageRecord,
        packed: &Packed,
    ) -> bool {
        if !self.gate(tracker, VerifyStep::Compare) {
            return false;
        }
        let pair = fetch_manifests(
            self.collaborators.http,
            &packed.path,
            &record.tarball_location,
            self.collaborators.deadline,
        );
        match pair {
            Ok(pair) => {
                let changes = pair.diff();
                tracker.trace(
                    serde_json::to_string_pretty(&changes).unwrap_or_else(|err| err.to_string()),
                );
                if changes.is_empty() {
                    tracker.pass(VerifyStep::Compare);
                    true
                } else {
                    let err = VerifyError::Compare {
                        reason: changes.summary(),
                    };
                    tracker.fail(VerifyStep::Compare, err.to_string());
                    false
                }
            }
            Err(err) => {
                let err = VerifyError::from(err);
                tracker.fail(VerifyStep::Compare, err.to_string());
                false
            }
        }
    }
}

/// Mirrors the builder's install sub-step onto the step table.
pub(crate) fn track_install<K: StepKey>(
    tracker: &mut Tracker<'_, K>,
    event: BuildEvent,
    install: K,
    pack: K,
) {
    match event {
        BuildEvent::InstallSkipped => tracker.skip(install),
        BuildEvent::InstallStarted => {
            tracker.transition(pack, StepStatus::Pending, Some("waiting for dependencies".to_owned()));
            tracker.working(install);
        }
        BuildEvent::InstallPassed => {
            tracker.pass(install);
            tracker.working(pack);
        }
        BuildEvent::InstallFailed(reason) => tracker.fail(install, reason),
    }
}
