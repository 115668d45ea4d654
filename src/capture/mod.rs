//! Snapshot capture backends.
//!
//! A capturer enumerates the configured targets each run and produces the
//! raw snapshot bytes for one target, usually by running a privileged
//! external command. The orchestrator owns the timeout around `capture`.

mod crontab;
mod schtasks;

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AppConfig, CaptureBackend, ConfigError};

pub use crontab::CrontabCapturer;
pub use schtasks::SchtasksCapturer;

/// One independently backed-up entity. Identity is `(namespace, id)`; the
/// storage key is built from `id` alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    pub namespace: String,
    pub id: String,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

/// How changes are tracked for a backend's targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Today's content is diffed line by line against yesterday's snapshot.
    PerTargetDiff,
    /// Only presence or absence of targets is tracked across the batch.
    Presence,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("capture command exited with {status}: {stderr}")]
    CommandFailed { status: ExitStatus, stderr: String },
    #[error("failed to enumerate targets: {0}")]
    Enumerate(String),
}

#[async_trait]
pub trait SnapshotCapturer: Send + Sync {
    /// Enumerate the targets to back up this run.
    async fn list_targets(&self) -> Result<Vec<Target>, CaptureError>;

    /// Produce the raw snapshot bytes for one target. A failure here is
    /// isolated to that target.
    async fn capture(&self, target: &Target) -> Result<Vec<u8>, CaptureError>;

    fn tracking(&self) -> TrackingMode;

    /// File extension of the persisted snapshot artifact.
    fn artifact_ext(&self) -> &'static str;
}

/// Build the capture backend selected by config.
pub fn create_capturer(config: &AppConfig) -> Result<Arc<dyn SnapshotCapturer>, ConfigError> {
    match config.capture_backend {
        CaptureBackend::Crontab => Ok(Arc::new(CrontabCapturer::new(config.users()))),
        CaptureBackend::Schtasks => {
            let command = config
                .capture_command
                .clone()
                .ok_or(ConfigError::Missing("capture_command"))?;
            Ok(Arc::new(SchtasksCapturer::new(command, config.targets())))
        }
    }
}
