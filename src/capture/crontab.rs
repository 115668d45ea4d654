use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CaptureError, SnapshotCapturer, Target, TrackingMode};

const NAMESPACE: &str = "crontab";

/// Captures per-user cron tables by running `crontab -l` as each configured
/// user. Requires the process to be allowed `sudo -u <user> crontab -l`
/// without a password prompt.
pub struct CrontabCapturer {
    users: Vec<String>,
}

impl CrontabCapturer {
    pub fn new(users: Vec<String>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl SnapshotCapturer for CrontabCapturer {
    async fn list_targets(&self) -> Result<Vec<Target>, CaptureError> {
        Ok(self
            .users
            .iter()
            .map(|user| Target {
                namespace: NAMESPACE.to_string(),
                id: user.clone(),
            })
            .collect())
    }

    async fn capture(&self, target: &Target) -> Result<Vec<u8>, CaptureError> {
        debug!(user = %target.id, "capturing crontab");

        let output = Command::new("sudo")
            .args(["-n", "-u", target.id.as_str(), "crontab", "-l"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::Spawn {
                command: "sudo".to_string(),
                source: e,
            })?;

        if !output.status.success() {
            // A user without a crontab exits non-zero; that is recorded as a
            // capture error for the target, same as any other failure.
            return Err(CaptureError::CommandFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    fn tracking(&self) -> TrackingMode {
        TrackingMode::PerTargetDiff
    }

    fn artifact_ext(&self) -> &'static str {
        "txt"
    }
}
