//! Rendering of the final step table.
//!
//! Human output lists every step with a status marker, the reason for
//! failed and warned steps, and a closing `PASSED` or `FAILED` line. JSON
//! output carries the same information for scripting.

use crate::engine::Report;
use crate::progress::{StepKey, StepStatus};
use serde::Serialize;

/// Marker printed before a step's title.
#[must_use]
pub fn status_marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => " ",
        StepStatus::Working => "…",
        StepStatus::Pass => "✓",
        StepStatus::Fail => "✗",
        StepStatus::Warn => "!",
        StepStatus::Skipped => "-",
    }
}

/// Formats a report for the terminal.
///
/// # Examples
///
/// ```
/// use tbv::engine::{LogObserver, Tracker};
/// use tbv::output::format_human;
/// use tbv::verify::VerifyStep;
///
/// let mut observer = LogObserver;
/// let mut tracker = Tracker::new(&mut observer);
/// tracker.fail(VerifyStep::Registry, "error fetching package data from registry");
/// let text = format_human(&tracker.conclude(None));
/// assert!(text.contains("✗ Fetch package data from registry"));
/// assert!(text.ends_with("FAILED: Fetch package data from registry: error fetching package data from registry\n"));
/// ```
#[must_use]
pub fn format_human<K: StepKey>(report: &Report<K>) -> String {
    let mut output = String::new();
    for step in report.progress.iter() {
        output.push_str(&format!(
            "{} {} ({})\n",
            status_marker(step.status()),
            step.title(),
            step.status()
        ));
        if let (StepStatus::Fail | StepStatus::Warn, Some(reason)) = (step.status(), step.reason()) {
            output.push_str(&format!("    {reason}\n"));
        }
    }
    output.push('\n');
    let verdict = if report.success { "PASSED" } else { "FAILED" };
    output.push_str(&format!("{verdict}: {}\n", report.reason));
    output
}

/// Formats a report as pretty-printed JSON.
#[must_use]
pub fn format_json<K: StepKey>(report: &Report<K>) -> String {
    let json = ReportJson::from_report(report);
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serializable report.
#[derive(Debug, Serialize)]
pub struct ReportJson {
    /// Whether the run passed.
    pub success: bool,
    /// What was verified, or why it failed.
    pub reason: String,
    /// Every step in display order.
    pub steps: Vec<StepJson>,
}

/// One row of the step table.
#[derive(Debug, Serialize)]
pub struct StepJson {
    /// Stable step identifier.
    pub name: &'static str,
    /// Display title.
    pub title: &'static str,
    /// Final status.
    pub status: StepStatus,
    /// Reason attached to the final status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReportJson {
    /// Builds the JSON view of `report`.
    #[must_use]
    pub fn from_report<K: StepKey>(report: &Report<K>) -> Self {
        Self {
            success: report.success,
            reason: report.reason.clone(),
            steps: report
                .progress
                .iter()
                .map(|step| StepJson {
                    name: step.name(),
                    title: step.title(),
                    status: step.status(),
                    reason: step.reason().map(str::to_owned),
                })
                .collect(),
        }
    }
}
