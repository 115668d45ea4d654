//! Application configuration.
//!
//! A TOML profile file (the CLI's positional argument) is merged with raw
//! environment variables of the same, lowercased names; the environment
//! wins. All values are read once into an immutable `AppConfig` before any
//! target is processed; a missing or malformed required setting is fatal.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use thiserror::Error;

/// Fallback profile when no config path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "/etc/jobvault/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::Fs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    /// Per-user cron tables, diffed line by line.
    Crontab,
    /// Scheduled-task folders, tracked by presence.
    Schtasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyChannel {
    None,
    Email,
    Webhook,
}

impl Default for NotifyChannel {
    fn default() -> Self {
        Self::Email
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Comma-separated scheduled-task folders (schtasks backend).
    #[serde(default)]
    pub backup_targets: String,
    /// Comma-separated target names excluded from every run.
    #[serde(default)]
    pub ignored_target_names: String,
    /// Snapshots older than this many days are purged after each run.
    pub retention_days: u32,

    #[serde(default)]
    pub storage_backend: StorageBackend,
    pub storage_bucket: String,
    #[serde(default)]
    pub storage_prefix: Option<String>,
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    pub capture_backend: CaptureBackend,
    /// Query/export command for the schtasks backend.
    #[serde(default)]
    pub capture_command: Option<String>,
    /// Comma-separated user accounts for the crontab backend.
    #[serde(default)]
    pub users: String,
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub notify_channel: NotifyChannel,
    #[serde(default)]
    pub email_host: Option<String>,
    #[serde(default = "default_email_port")]
    pub email_port: u16,
    #[serde(default)]
    pub email_user: Option<String>,
    #[serde(default)]
    pub email_password: Option<String>,
    #[serde(default)]
    pub email_sender: Option<String>,
    /// Comma-separated recipient addresses.
    #[serde(default)]
    pub email_to: String,
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// When set, the run log is written here and attached to the report.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("/var/lib/jobvault")
}

fn default_capture_timeout() -> u64 {
    30
}

fn default_max_workers() -> usize {
    4
}

fn default_email_port() -> u16 {
    587
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let figment = match path {
            Some(path) => Figment::new().merge(Toml::file_exact(path)),
            None => Figment::new().merge(Toml::file(DEFAULT_CONFIG_PATH)),
        };
        let config: AppConfig = figment
            .merge(Env::raw())
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_bucket.trim().is_empty() {
            return Err(ConfigError::Missing("storage_bucket"));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "max_workers",
                reason: "must be at least 1".to_string(),
            });
        }

        match self.capture_backend {
            CaptureBackend::Crontab => {
                if self.users().is_empty() {
                    return Err(ConfigError::Missing("users"));
                }
            }
            CaptureBackend::Schtasks => {
                if self.capture_command.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::Missing("capture_command"));
                }
                if self.targets().is_empty() {
                    return Err(ConfigError::Missing("backup_targets"));
                }
            }
        }

        match self.notify_channel {
            NotifyChannel::None => {}
            NotifyChannel::Email => {
                let required: [(&'static str, &Option<String>); 4] = [
                    ("email_host", &self.email_host),
                    ("email_user", &self.email_user),
                    ("email_password", &self.email_password),
                    ("email_sender", &self.email_sender),
                ];
                for (key, value) in required {
                    if value.as_deref().unwrap_or("").is_empty() {
                        return Err(ConfigError::Missing(key));
                    }
                }
                if self.recipients().is_empty() {
                    return Err(ConfigError::Missing("email_to"));
                }
            }
            NotifyChannel::Webhook => {
                if self.webhook_url.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::Missing("webhook_url"));
                }
            }
        }

        Ok(())
    }

    pub fn targets(&self) -> Vec<String> {
        split_csv(&self.backup_targets)
    }

    pub fn ignored_targets(&self) -> Vec<String> {
        split_csv(&self.ignored_target_names)
    }

    pub fn users(&self) -> Vec<String> {
        split_csv(&self.users)
    }

    pub fn recipients(&self) -> Vec<String> {
        split_csv(&self.email_to)
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_minimum(jail: &mut figment::Jail) {
        jail.set_env("CAPTURE_BACKEND", "crontab");
        jail.set_env("USERS", "root, deploy");
        jail.set_env("RETENTION_DAYS", "7");
        jail.set_env("STORAGE_BACKEND", "memory");
        jail.set_env("STORAGE_BUCKET", "backups");
        jail.set_env("NOTIFY_CHANNEL", "none");
    }

    #[test]
    fn loads_from_environment() {
        figment::Jail::expect_with(|jail| {
            set_minimum(jail);
            jail.set_env("IGNORED_TARGET_NAMES", "scratch");

            let config = AppConfig::load(None).unwrap();
            assert_eq!(config.retention_days, 7);
            assert_eq!(config.users(), vec!["root", "deploy"]);
            assert_eq!(config.ignored_targets(), vec!["scratch"]);
            assert_eq!(config.capture_timeout_secs, 30);
            assert_eq!(config.notify_channel, NotifyChannel::None);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "jobvault.toml",
                r#"
                    capture_backend = "crontab"
                    users = "root"
                    retention_days = 30
                    storage_backend = "memory"
                    storage_bucket = "backups"
                    notify_channel = "none"
                "#,
            )?;
            jail.set_env("RETENTION_DAYS", "3");

            let config = AppConfig::load(Some(Path::new("jobvault.toml"))).unwrap();
            assert_eq!(config.retention_days, 3);
            assert_eq!(config.users(), vec!["root"]);
            Ok(())
        });
    }

    #[test]
    fn missing_required_setting_is_fatal() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("CAPTURE_BACKEND", "crontab");
            jail.set_env("USERS", "root");
            // retention_days and storage_bucket left unset
            assert!(AppConfig::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn backend_specific_settings_are_required() {
        figment::Jail::expect_with(|jail| {
            set_minimum(jail);
            jail.set_env("CAPTURE_BACKEND", "schtasks");
            jail.set_env("USERS", "");

            let err = AppConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::Missing("capture_command")));

            jail.set_env("CAPTURE_COMMAND", "schtasks");
            let err = AppConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::Missing("backup_targets")));

            jail.set_env("BACKUP_TARGETS", "Nightly");
            assert!(AppConfig::load(None).is_ok());
            Ok(())
        });
    }

    #[test]
    fn email_channel_requires_transport_settings() {
        figment::Jail::expect_with(|jail| {
            set_minimum(jail);
            jail.set_env("NOTIFY_CHANNEL", "email");

            let err = AppConfig::load(None).unwrap_err();
            assert!(matches!(err, ConfigError::Missing("email_host")));

            jail.set_env("EMAIL_HOST", "smtp.example.com");
            jail.set_env("EMAIL_USER", "backup");
            jail.set_env("EMAIL_PASSWORD", "secret");
            jail.set_env("EMAIL_SENDER", "backup@example.com");
            jail.set_env("EMAIL_TO", "ops@example.com, oncall@example.com");

            let config = AppConfig::load(None).unwrap();
            assert_eq!(config.email_port, 587);
            assert_eq!(
                config.recipients(),
                vec!["ops@example.com", "oncall@example.com"]
            );
            Ok(())
        });
    }
}
