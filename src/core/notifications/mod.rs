//! Change report delivery.
//!
//! The notifier composes one textual summary per run from the `RunReport`
//! and delivers it through the configured channel. Delivery failure is
//! logged by the orchestrator, never escalated to a run failure.

mod email;
mod webhook;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AppConfig, ConfigError, NotifyChannel};
use crate::core::diff::LineDiff;
use crate::core::report::{ChangeSet, RunReport, TargetChange};

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to compose message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("invalid e-mail address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("webhook delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read run log: {0}")]
    Attachment(#[from] std::io::Error),
}

/// Delivers one aggregated change/error report per run, with the run's log
/// attached when one was written.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn notify(&self, report: &RunReport, run_log: Option<&Path>) -> Result<(), NotifyError>;
}

/// Build the configured notification channel, if any.
pub fn create_notifier(config: &AppConfig) -> Result<Option<Arc<dyn ChangeNotifier>>, ConfigError> {
    match config.notify_channel {
        NotifyChannel::None => Ok(None),
        NotifyChannel::Email => Ok(Some(Arc::new(EmailNotifier::from_config(config)?))),
        NotifyChannel::Webhook => {
            let url = config
                .webhook_url
                .clone()
                .ok_or(ConfigError::Missing("webhook_url"))?;
            Ok(Some(Arc::new(WebhookNotifier::new(url))))
        }
    }
}

pub fn compose_subject(report: &RunReport) -> String {
    let date = report.date.format("%Y-%m-%d");
    match (report.has_changes(), report.has_errors()) {
        (true, _) => format!("Backup changes detected for {date}"),
        (false, true) => format!("Backup errors for {date}"),
        (false, false) => format!("Backup report for {date}"),
    }
}

pub fn compose_body(report: &RunReport) -> String {
    let mut sections = Vec::new();

    match &report.changes {
        ChangeSet::Presence {
            new_targets,
            removed_targets,
        } => {
            if !new_targets.is_empty() {
                sections.push(list_section("New targets:", new_targets.iter()));
            }
            if !removed_targets.is_empty() {
                sections.push(list_section("Removed targets:", removed_targets.iter()));
            }
        }
        ChangeSet::PerTarget(map) => {
            for (id, change) in map {
                match change {
                    TargetChange::New => {
                        sections.push(format!("{id}: first backup, no previous snapshot to compare"));
                    }
                    TargetChange::Changed(diff) => sections.push(diff_section(id, diff)),
                }
            }
        }
    }

    if !report.capture_errors.is_empty() {
        sections.push(list_section(
            "Capture errors:",
            report
                .capture_errors
                .iter()
                .map(|e| format!("{}: {}", e.target, e.reason)),
        ));
    }
    if !report.store_errors.is_empty() {
        sections.push(list_section(
            "Storage errors:",
            report
                .store_errors
                .iter()
                .map(|e| format!("{}: {}", e.key, e.reason)),
        ));
    }
    if !report.purged_keys.is_empty() {
        sections.push(format!(
            "Purged {} expired snapshot(s).",
            report.purged_keys.len()
        ));
    }

    if sections.is_empty() {
        return "No changes detected.".to_string();
    }
    sections.join("\n\n")
}

fn list_section<I, S>(title: &str, items: I) -> String
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let mut section = title.to_string();
    for item in items {
        let _ = write!(section, "\n  {}", item.as_ref());
    }
    section
}

fn diff_section(target_id: &str, diff: &LineDiff) -> String {
    let mut section = format!("Changes for {target_id}:");
    if !diff.added.is_empty() {
        section.push_str("\nAdded lines:");
        for (line, text) in &diff.added {
            let _ = write!(section, "\n  line {line}: {text}");
        }
    }
    if !diff.removed.is_empty() {
        section.push_str("\nRemoved lines:");
        for (line, text) in &diff.removed {
            let _ = write!(section, "\n  line {line}: {text}");
        }
    }
    if !diff.modified.is_empty() {
        section.push_str("\nModified lines:");
        for (line, old, new) in &diff.modified {
            let _ = write!(section, "\n  line {line}:\n    old: {old}\n    new: {new}");
        }
    }
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TrackingMode;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn report(tracking: TrackingMode) -> RunReport {
        RunReport::new(
            Uuid::now_v7(),
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            tracking,
        )
    }

    #[test]
    fn body_lists_per_target_diff_sections() {
        let mut report = report(TrackingMode::PerTargetDiff);
        let mut diff = LineDiff::default();
        diff.modified.push((2, "b".to_string(), "c".to_string()));
        report.record_change("root", TargetChange::Changed(diff));
        report.record_change("deploy", TargetChange::New);

        let body = compose_body(&report);
        assert!(body.contains("Changes for root:"));
        assert!(body.contains("Modified lines:"));
        assert!(body.contains("line 2:"));
        assert!(body.contains("old: b"));
        assert!(body.contains("new: c"));
        assert!(body.contains("deploy: first backup"));
    }

    #[test]
    fn body_lists_presence_sets() {
        let mut report = report(TrackingMode::Presence);
        report.changes = ChangeSet::Presence {
            new_targets: BTreeSet::from(["fresh-task".to_string()]),
            removed_targets: BTreeSet::from(["gone-task".to_string()]),
        };

        let body = compose_body(&report);
        assert!(body.contains("New targets:\n  fresh-task"));
        assert!(body.contains("Removed targets:\n  gone-task"));
    }

    #[test]
    fn body_carries_error_sections() {
        let mut report = report(TrackingMode::PerTargetDiff);
        report.record_capture_error("crontab/root".to_string(), "exit status 1".to_string());
        report.record_store_error("root_20260807.txt".to_string(), "disk full".to_string());

        let body = compose_body(&report);
        assert!(body.contains("Capture errors:\n  crontab/root: exit status 1"));
        assert!(body.contains("Storage errors:\n  root_20260807.txt: disk full"));
    }

    #[test]
    fn subject_reflects_report_state() {
        let mut changed = report(TrackingMode::PerTargetDiff);
        changed.record_change("root", TargetChange::New);
        assert!(compose_subject(&changed).starts_with("Backup changes detected"));

        let mut errored = report(TrackingMode::PerTargetDiff);
        errored.record_capture_error("a".to_string(), "b".to_string());
        assert!(compose_subject(&errored).starts_with("Backup errors"));

        assert!(compose_subject(&report(TrackingMode::PerTargetDiff)).starts_with("Backup report"));
    }

    #[test]
    fn empty_report_body_says_no_changes() {
        assert_eq!(
            compose_body(&report(TrackingMode::PerTargetDiff)),
            "No changes detected."
        );
    }
}
