use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use super::{CaptureError, SnapshotCapturer, Target, TrackingMode};

/// Captures scheduled tasks through a `schtasks`-compatible command.
///
/// Enumeration runs `<cmd> /Query /FO LIST /V` and keeps tasks under the
/// configured folders; capture exports one task as XML with
/// `<cmd> /Query /TN <path> /XML`. The target namespace is the task's parent
/// folder path, the id is the task name.
pub struct SchtasksCapturer {
    command: String,
    folders: Vec<String>,
    task_name_re: Regex,
}

impl SchtasksCapturer {
    pub fn new(command: String, folders: Vec<String>) -> Self {
        let folders = folders
            .into_iter()
            .map(|f| f.trim_start_matches('\\').to_string())
            .collect();
        Self {
            command,
            folders,
            task_name_re: Regex::new(r"(?m)^TaskName:\s*(\S.*)$").unwrap(),
        }
    }

    fn parse_task_list(&self, output: &str) -> Vec<Target> {
        let mut targets = Vec::new();
        for caps in self.task_name_re.captures_iter(output) {
            let full = caps[1].trim().trim_start_matches('\\');
            // Tasks at the scheduler root have no folder and are not covered
            // by any configured namespace.
            let Some((folder, name)) = full.rsplit_once('\\') else {
                continue;
            };
            if !self.folders.iter().any(|f| full.starts_with(f.as_str())) {
                continue;
            }
            targets.push(Target {
                namespace: folder.to_string(),
                id: name.to_string(),
            });
        }
        targets.sort();
        targets.dedup();
        targets
    }
}

#[async_trait]
impl SnapshotCapturer for SchtasksCapturer {
    async fn list_targets(&self) -> Result<Vec<Target>, CaptureError> {
        let output = Command::new(&self.command)
            .args(["/Query", "/FO", "LIST", "/V"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(CaptureError::Enumerate(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let targets = self.parse_task_list(&String::from_utf8_lossy(&output.stdout));
        debug!(count = targets.len(), "enumerated scheduled tasks");
        Ok(targets)
    }

    async fn capture(&self, target: &Target) -> Result<Vec<u8>, CaptureError> {
        let task_path = format!("\\{}\\{}", target.namespace, target.id);
        debug!(task = %task_path, "exporting scheduled task");

        let output = Command::new(&self.command)
            .args(["/Query", "/TN", task_path.as_str(), "/XML"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(CaptureError::CommandFailed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output.stdout)
    }

    fn tracking(&self) -> TrackingMode {
        TrackingMode::Presence
    }

    fn artifact_ext(&self) -> &'static str {
        "xml"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUERY_OUTPUT: &str = "\
HostName:      BUILD01
TaskName:      \\Nightly\\db-backup
Next Run Time: 8/8/2026 3:00:00 AM
Status:        Ready

HostName:      BUILD01
TaskName:      \\Nightly\\log-rotate
Status:        Ready

HostName:      BUILD01
TaskName:      \\Adhoc\\one-off
Status:        Ready

HostName:      BUILD01
TaskName:      \\root-task
Status:        Ready
";

    #[test]
    fn parses_tasks_under_configured_folders() {
        let capturer = SchtasksCapturer::new("schtasks".to_string(), vec!["Nightly".to_string()]);
        let targets = capturer.parse_task_list(QUERY_OUTPUT);

        assert_eq!(
            targets,
            vec![
                Target {
                    namespace: "Nightly".to_string(),
                    id: "db-backup".to_string()
                },
                Target {
                    namespace: "Nightly".to_string(),
                    id: "log-rotate".to_string()
                },
            ]
        );
    }

    #[test]
    fn folder_filter_accepts_leading_backslash() {
        let capturer = SchtasksCapturer::new("schtasks".to_string(), vec!["\\Adhoc".to_string()]);
        let targets = capturer.parse_task_list(QUERY_OUTPUT);

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, "one-off");
    }

    #[test]
    fn nested_folders_keep_full_parent_path() {
        let capturer = SchtasksCapturer::new("schtasks".to_string(), vec!["Ops".to_string()]);
        let targets = capturer.parse_task_list("TaskName:      \\Ops\\Sub\\deep-task\n");

        assert_eq!(targets[0].namespace, "Ops\\Sub");
        assert_eq!(targets[0].id, "deep-task");
    }

    #[test]
    fn tracks_presence_only() {
        let capturer = SchtasksCapturer::new("schtasks".to_string(), vec![]);
        assert_eq!(capturer.tracking(), TrackingMode::Presence);
        assert_eq!(capturer.artifact_ext(), "xml");
    }
}
