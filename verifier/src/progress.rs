//! Step and progress model for the verification pipelines.
//!
//! A [`Progress`] table is created once per run with every step `pending`.
//! Steps are mutated in place and never removed, so the final snapshot is the
//! run's audit trail. Any transition to [`StepStatus::Fail`] sets a sticky
//! failure flag that stays set for the rest of the run.

use serde::Serialize;
use std::fmt;

/// Status of a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not yet attempted.
    Pending,
    /// Currently running.
    Working,
    /// Completed successfully.
    Pass,
    /// Failed; the run cannot succeed.
    Fail,
    /// Completed with a non-fatal concern.
    Warn,
    /// Not needed for this run.
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Warn => "warn",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// A fixed, ordered set of step identifiers for one pipeline variant.
pub trait StepKey: Copy + Eq + fmt::Debug + 'static {
    /// Every step, in display order.
    const ALL: &'static [Self];

    /// Stable machine-readable name, e.g. `gitHead`.
    fn name(self) -> &'static str;

    /// Human-readable title shown in the step table.
    fn title(self) -> &'static str;
}

/// One row of the progress table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step<K> {
    key: K,
    status: StepStatus,
    reason: Option<String>,
}

impl<K: StepKey> Step<K> {
    /// The step's identifier.
    #[must_use]
    pub fn key(&self) -> K {
        self.key
    }

    /// The step's stable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    /// The step's display title.
    #[must_use]
    pub fn title(&self) -> &'static str {
        self.key.title()
    }

    /// The current status.
    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// The reason attached by the most recent transition, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Ordered table of steps for a single run.
///
/// # Examples
///
/// ```
/// use tbv::progress::{Progress, StepStatus};
/// use tbv::verify::VerifyStep;
///
/// let mut progress = Progress::<VerifyStep>::new();
/// progress.transition(VerifyStep::Registry, StepStatus::Fail, Some("offline".to_owned()));
/// assert!(progress.has_failed());
///
/// progress.transition(VerifyStep::Registry, StepStatus::Pass, None);
/// assert!(progress.has_failed(), "the failure flag is sticky");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress<K> {
    steps: Vec<Step<K>>,
    failed: bool,
}

impl<K: StepKey> Progress<K> {
    /// Creates a table with every step of `K` pending.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: K::ALL
                .iter()
                .map(|&key| Step {
                    key,
                    status: StepStatus::Pending,
                    reason: None,
                })
                .collect(),
            failed: false,
        }
    }

    /// Sets `key` to `status`, replacing its reason with `reason`.
    ///
    /// No ordering rules are enforced here; callers only issue forward
    /// transitions.
    pub fn transition(&mut self, key: K, status: StepStatus, reason: Option<String>) {
        if let Some(step) = self.steps.iter_mut().find(|step| step.key == key) {
            step.status = status;
            step.reason = reason;
        }
        if status == StepStatus::Fail {
            self.failed = true;
        }
    }

    /// Returns the step for `key`.
    #[must_use]
    pub fn step(&self, key: K) -> Option<&Step<K>> {
        self.steps.iter().find(|step| step.key == key)
    }

    /// Returns the status of `key`, or `Pending` if unknown.
    #[must_use]
    pub fn status(&self, key: K) -> StepStatus {
        self.step(key).map_or(StepStatus::Pending, Step::status)
    }

    /// Iterates the steps in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Step<K>> {
        self.steps.iter()
    }

    /// True once any step has failed.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// The first failed step, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&Step<K>> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Fail)
    }
}

impl<K: StepKey> Default for Progress<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Demo {
        First,
        Second,
    }

    impl StepKey for Demo {
        const ALL: &'static [Self] = &[Self::First, Self::Second];

        fn name(self) -> &'static str {
            match self {
                Self::First => "first",
                Self::Second => "second",
            }
        }

        fn title(self) -> &'static str {
            match self {
                Self::First => "First step",
                Self::Second => "Second step",
            }
        }
    }

    #[test]
    fn new_progress_is_all_pending_in_order() {
        let progress = Progress::<Demo>::new();
        let names: Vec<_> = progress.iter().map(Step::name).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(progress.iter().all(|s| s.status() == StepStatus::Pending));
        assert!(!progress.has_failed());
    }

    #[rstest]
    #[case::pass(StepStatus::Pass, false)]
    #[case::warn(StepStatus::Warn, false)]
    #[case::skipped(StepStatus::Skipped, false)]
    #[case::fail(StepStatus::Fail, true)]
    fn only_fail_sets_the_sticky_flag(#[case] status: StepStatus, #[case] failed: bool) {
        let mut progress = Progress::<Demo>::new();
        progress.transition(Demo::First, status, None);
        assert_eq!(progress.has_failed(), failed);
    }

    #[test]
    fn failure_flag_survives_later_transitions() {
        let mut progress = Progress::<Demo>::new();
        progress.transition(Demo::First, StepStatus::Fail, Some("boom".to_owned()));
        progress.transition(Demo::First, StepStatus::Pass, None);
        progress.transition(Demo::Second, StepStatus::Pass, None);
        assert!(progress.has_failed());
    }

    #[test]
    fn transition_replaces_reason() {
        let mut progress = Progress::<Demo>::new();
        progress.transition(
            Demo::Second,
            StepStatus::Pending,
            Some("waiting for dependencies".to_owned()),
        );
        progress.transition(Demo::Second, StepStatus::Pass, None);
        let step = progress.step(Demo::Second).expect("known step");
        assert_eq!(step.status(), StepStatus::Pass);
        assert!(step.reason().is_none());
    }

    #[test]
    fn first_failure_reports_earliest_failed_step() {
        let mut progress = Progress::<Demo>::new();
        progress.transition(Demo::Second, StepStatus::Fail, Some("late".to_owned()));
        let failed = progress.first_failure().expect("a failure");
        assert_eq!(failed.key(), Demo::Second);
        assert_eq!(failed.reason(), Some("late"));
    }

    #[test]
    fn statuses_display_in_lowercase() {
        assert_eq!(StepStatus::Skipped.to_string(), "skipped");
        assert_eq!(StepStatus::Warn.to_string(), "warn");
    }
}
