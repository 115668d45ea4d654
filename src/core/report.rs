//! Run-scoped aggregation of changes and errors.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::capture::TrackingMode;
use crate::core::diff::LineDiff;

/// What happened to one target since the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    /// No prior-day snapshot existed; this is the first backup.
    New,
    Changed(LineDiff),
}

/// Changes observed across one run, in the shape the active capture backend
/// tracks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSet {
    /// Per-target content changes, keyed by target id.
    PerTarget(BTreeMap<String, TargetChange>),
    /// Presence changes across the whole batch.
    Presence {
        new_targets: BTreeSet<String>,
        removed_targets: BTreeSet<String>,
    },
}

impl ChangeSet {
    pub fn empty(tracking: TrackingMode) -> Self {
        match tracking {
            TrackingMode::PerTargetDiff => Self::PerTarget(BTreeMap::new()),
            TrackingMode::Presence => Self::Presence {
                new_targets: BTreeSet::new(),
                removed_targets: BTreeSet::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::PerTarget(map) => map.is_empty(),
            Self::Presence {
                new_targets,
                removed_targets,
            } => new_targets.is_empty() && removed_targets.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::PerTarget(map) => map.len(),
            Self::Presence {
                new_targets,
                removed_targets,
            } => new_targets.len() + removed_targets.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    pub target: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    pub key: String,
    pub reason: String,
}

/// Everything one run observed: changes, errors, and what retention purged.
///
/// Created at run start, owned by the orchestrator, consumed once by the
/// notifier at run end.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub changes: ChangeSet,
    pub capture_errors: Vec<CaptureFailure>,
    pub store_errors: Vec<StoreFailure>,
    pub purged_keys: Vec<String>,
}

impl RunReport {
    pub fn new(run_id: Uuid, date: NaiveDate, tracking: TrackingMode) -> Self {
        Self {
            run_id,
            date,
            changes: ChangeSet::empty(tracking),
            capture_errors: Vec::new(),
            store_errors: Vec::new(),
            purged_keys: Vec::new(),
        }
    }

    pub fn record_change(&mut self, target_id: &str, change: TargetChange) {
        if let ChangeSet::PerTarget(map) = &mut self.changes {
            map.insert(target_id.to_string(), change);
        }
    }

    pub fn record_capture_error(&mut self, target: String, reason: String) {
        self.capture_errors.push(CaptureFailure { target, reason });
    }

    pub fn record_store_error(&mut self, key: String, reason: String) {
        self.store_errors.push(StoreFailure { key, reason });
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.capture_errors.is_empty() || !self.store_errors.is_empty()
    }

    /// A report with neither changes nor errors sends no notification.
    pub fn is_empty(&self) -> bool {
        !self.has_changes() && !self.has_errors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(tracking: TrackingMode) -> RunReport {
        RunReport::new(
            Uuid::now_v7(),
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap(),
            tracking,
        )
    }

    #[test]
    fn fresh_report_is_empty() {
        assert!(report(TrackingMode::PerTargetDiff).is_empty());
        assert!(report(TrackingMode::Presence).is_empty());
    }

    #[test]
    fn recorded_change_makes_report_non_empty() {
        let mut report = report(TrackingMode::PerTargetDiff);
        report.record_change("root", TargetChange::New);

        assert!(report.has_changes());
        assert!(!report.is_empty());
        assert_eq!(report.changes.len(), 1);
    }

    #[test]
    fn errors_alone_make_report_non_empty() {
        let mut report = report(TrackingMode::PerTargetDiff);
        report.record_capture_error("crontab/root".to_string(), "exit status 1".to_string());

        assert!(!report.has_changes());
        assert!(report.has_errors());
        assert!(!report.is_empty());
    }

    #[test]
    fn per_target_changes_are_ignored_in_presence_mode() {
        let mut report = report(TrackingMode::Presence);
        report.record_change("task", TargetChange::New);
        assert!(report.is_empty());
    }
}
