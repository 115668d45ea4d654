//! Drives one backup run end to end.
//!
//! Per-target pipelines (capture → persist → diff-or-mark-new) execute on a
//! bounded worker pool and are isolated from each other; their results merge
//! into a single `RunReport`. Retention and notification run strictly after
//! every pipeline has completed, so the purge scan always sees this run's
//! snapshots already committed.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{SnapshotCapturer, Target, TrackingMode};
use crate::config::AppConfig;
use crate::core::diff::positional_diff;
use crate::core::notifications::ChangeNotifier;
use crate::core::report::{ChangeSet, RunReport, TargetChange};
use crate::core::retention::{self, RetentionPolicy};
use crate::keys;
use crate::store::ObjectStore;

pub struct Orchestrator {
    config: Arc<AppConfig>,
    store: Arc<dyn ObjectStore>,
    capturer: Arc<dyn SnapshotCapturer>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

/// Result of one target's pipeline, produced by a worker and folded into the
/// run report by the single accumulator loop.
enum Outcome {
    Backed {
        target: Target,
        change: Option<TargetChange>,
    },
    CaptureFailed {
        target: Target,
        reason: String,
    },
    StoreFailed {
        target: Target,
        key: String,
        reason: String,
    },
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn ObjectStore>,
        capturer: Arc<dyn SnapshotCapturer>,
        notifier: Option<Arc<dyn ChangeNotifier>>,
    ) -> Self {
        Self {
            config,
            store,
            capturer,
            notifier,
        }
    }

    /// Execute one run. Always terminates with a report, whatever the
    /// per-target outcomes; only configuration problems abort earlier,
    /// before an orchestrator exists.
    pub async fn run(&self, today: NaiveDate) -> RunReport {
        let run_id = Uuid::now_v7();
        let mut report = RunReport::new(run_id, today, self.capturer.tracking());
        info!(%run_id, date = %today, "starting backup run");

        let targets = self.enumerate_targets(&mut report).await;
        self.back_up_all(&mut report, targets, today).await;

        if self.capturer.tracking() == TrackingMode::Presence {
            self.collect_presence_changes(&mut report, today).await;
        }

        let policy = RetentionPolicy {
            cutoff_days: self.config.retention_days,
        };
        let (purged, failures) =
            retention::purge(self.store.as_ref(), &policy, self.prefix(), today).await;
        report.purged_keys = purged;
        report.store_errors.extend(failures);

        self.send_notification(&report).await;

        info!(
            %run_id,
            changes = report.changes.len(),
            capture_errors = report.capture_errors.len(),
            store_errors = report.store_errors.len(),
            purged = report.purged_keys.len(),
            "backup run complete"
        );
        report
    }

    fn prefix(&self) -> &str {
        self.config.storage_prefix.as_deref().unwrap_or("")
    }

    async fn enumerate_targets(&self, report: &mut RunReport) -> Vec<Target> {
        let ignored = self.config.ignored_targets();
        match self.capturer.list_targets().await {
            Ok(targets) => targets
                .into_iter()
                .filter(|target| {
                    if ignored.iter().any(|name| name == &target.id) {
                        info!(target = %target, "ignoring target");
                        false
                    } else {
                        true
                    }
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "target enumeration failed");
                report.record_capture_error("<enumeration>".to_string(), e.to_string());
                Vec::new()
            }
        }
    }

    async fn back_up_all(&self, report: &mut RunReport, targets: Vec<Target>, today: NaiveDate) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut workers = JoinSet::new();

        for target in targets {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let capturer = self.capturer.clone();
            let prefix = self.config.storage_prefix.clone();
            let capture_timeout = Duration::from_secs(self.config.capture_timeout_secs);

            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                back_up_target(store, capturer, prefix, capture_timeout, today, target).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => self.record(report, outcome),
                Err(e) => warn!(error = %e, "backup worker panicked"),
            }
        }
    }

    fn record(&self, report: &mut RunReport, outcome: Outcome) {
        match outcome {
            Outcome::Backed { target, change } => {
                if let Some(change) = change {
                    report.record_change(&target.id, change);
                }
            }
            Outcome::CaptureFailed { target, reason } => {
                warn!(target = %target, reason = %reason, "capture failed");
                report.record_capture_error(target.to_string(), reason);
            }
            Outcome::StoreFailed {
                target,
                key,
                reason,
            } => {
                warn!(target = %target, %key, reason = %reason, "storage failed");
                report.record_store_error(key, reason);
            }
        }
    }

    /// Presence tracking compares what actually got persisted: today's ids
    /// against yesterday's, recovered from the store listing.
    async fn collect_presence_changes(&self, report: &mut RunReport, today: NaiveDate) {
        let listing = match self.store.list(self.prefix()).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(error = %e, "failed to list snapshots for presence diff");
                report.record_store_error(self.prefix().to_string(), e.to_string());
                return;
            }
        };

        let yesterday = today.pred_opt();
        let mut today_ids = BTreeSet::new();
        let mut yesterday_ids = BTreeSet::new();
        for key in listing {
            let Some(parsed) = keys::parse_key(&key) else {
                continue;
            };
            if parsed.date == today {
                today_ids.insert(parsed.target_id);
            } else if Some(parsed.date) == yesterday {
                yesterday_ids.insert(parsed.target_id);
            }
        }

        report.changes = ChangeSet::Presence {
            new_targets: &today_ids - &yesterday_ids,
            removed_targets: &yesterday_ids - &today_ids,
        };
    }

    async fn send_notification(&self, report: &RunReport) {
        if report.is_empty() {
            debug!("nothing to report, skipping notification");
            return;
        }
        let Some(notifier) = &self.notifier else {
            debug!("notifications disabled");
            return;
        };
        if let Err(e) = notifier
            .notify(report, self.config.log_file.as_deref())
            .await
        {
            warn!(error = %e, "failed to deliver change report");
        }
    }
}

async fn back_up_target(
    store: Arc<dyn ObjectStore>,
    capturer: Arc<dyn SnapshotCapturer>,
    prefix: Option<String>,
    capture_timeout: Duration,
    today: NaiveDate,
    target: Target,
) -> Outcome {
    let content = match timeout(capture_timeout, capturer.capture(&target)).await {
        Err(_) => {
            return Outcome::CaptureFailed {
                reason: format!("capture timed out after {}s", capture_timeout.as_secs()),
                target,
            };
        }
        Ok(Err(e)) => {
            return Outcome::CaptureFailed {
                reason: e.to_string(),
                target,
            };
        }
        Ok(Ok(content)) => content,
    };
    debug!(target = %target, bytes = content.len(), "captured snapshot");

    let ext = capturer.artifact_ext();
    let key = match keys::build_key(prefix.as_deref(), &target.id, today, ext) {
        Ok(key) => key,
        Err(e) => {
            return Outcome::StoreFailed {
                key: target.id.clone(),
                reason: e.to_string(),
                target,
            };
        }
    };

    // Same target, same date: the key is identical, so a rerun overwrites
    // today's snapshot in place.
    if let Err(e) = store.put(&key, &content).await {
        return Outcome::StoreFailed {
            reason: e.to_string(),
            key,
            target,
        };
    }
    info!(target = %target, %key, "snapshot persisted");

    if capturer.tracking() != TrackingMode::PerTargetDiff {
        return Outcome::Backed {
            target,
            change: None,
        };
    }

    let Some(yesterday) = today.pred_opt() else {
        return Outcome::Backed {
            target,
            change: Some(TargetChange::New),
        };
    };
    let previous_key = match keys::build_key(prefix.as_deref(), &target.id, yesterday, ext) {
        Ok(key) => key,
        Err(e) => {
            return Outcome::StoreFailed {
                key: target.id.clone(),
                reason: e.to_string(),
                target,
            };
        }
    };

    match store.get(&previous_key).await {
        Ok(None) => Outcome::Backed {
            target,
            change: Some(TargetChange::New),
        },
        Ok(Some(previous)) => {
            let old = String::from_utf8_lossy(&previous);
            let new = String::from_utf8_lossy(&content);
            let diff = positional_diff(&old, &new);
            let change = (!diff.is_empty()).then_some(TargetChange::Changed(diff));
            Outcome::Backed { target, change }
        }
        Err(e) => Outcome::StoreFailed {
            key: previous_key,
            reason: e.to_string(),
            target,
        },
    }
}
