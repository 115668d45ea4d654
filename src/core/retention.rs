//! Retention purge of expired snapshots.

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::core::report::StoreFailure;
use crate::keys;
use crate::store::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub cutoff_days: u32,
}

impl RetentionPolicy {
    /// Oldest date whose snapshots are still retained. Snapshots dated
    /// strictly before this are eligible for deletion.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.cutoff_days)))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Delete snapshots older than the retention cutoff.
///
/// Keys that do not parse as snapshot keys are skipped, never deleted.
/// Per-key deletion failures are reported back but do not stop the scan.
/// Must run only after the current run's snapshots are persisted.
pub async fn purge(
    store: &dyn ObjectStore,
    policy: &RetentionPolicy,
    prefix: &str,
    today: NaiveDate,
) -> (Vec<String>, Vec<StoreFailure>) {
    let listing = match store.list(prefix).await {
        Ok(listing) => listing,
        Err(e) => {
            warn!(error = %e, "retention scan failed to list snapshots");
            return (
                Vec::new(),
                vec![StoreFailure {
                    key: prefix.to_string(),
                    reason: e.to_string(),
                }],
            );
        }
    };

    let cutoff = policy.cutoff(today);
    let mut deleted = Vec::new();
    let mut failures = Vec::new();

    for key in listing {
        let Some(parsed) = keys::parse_key(&key) else {
            debug!(%key, "skipping key without snapshot layout");
            continue;
        };
        if parsed.date >= cutoff {
            continue;
        }
        match store.delete(&key).await {
            Ok(()) => {
                info!(%key, "deleted expired snapshot");
                deleted.push(key);
            }
            Err(e) => {
                warn!(%key, error = %e, "failed to delete expired snapshot");
                failures.push(StoreFailure {
                    key,
                    reason: e.to_string(),
                });
            }
        }
    }

    (deleted, failures)
}
