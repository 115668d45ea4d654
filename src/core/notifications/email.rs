use std::path::Path;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::{ChangeNotifier, NotifyError, compose_body, compose_subject};
use crate::config::{AppConfig, ConfigError};
use crate::core::report::RunReport;

/// Delivers the run report by e-mail over SMTP (STARTTLS), attaching the
/// run's log file when one was written.
pub struct EmailNotifier {
    host: String,
    port: u16,
    user: String,
    password: String,
    sender: String,
    recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let require = |value: &Option<String>, key: &'static str| {
            value.clone().ok_or(ConfigError::Missing(key))
        };
        let recipients = config.recipients();
        if recipients.is_empty() {
            return Err(ConfigError::Missing("email_to"));
        }
        Ok(Self {
            host: require(&config.email_host, "email_host")?,
            port: config.email_port,
            user: require(&config.email_user, "email_user")?,
            password: require(&config.email_password, "email_password")?,
            sender: require(&config.email_sender, "email_sender")?,
            recipients,
        })
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?
                .port(self.port)
                .credentials(Credentials::new(self.user.clone(), self.password.clone()))
                .build(),
        )
    }
}

#[async_trait]
impl ChangeNotifier for EmailNotifier {
    async fn notify(&self, report: &RunReport, run_log: Option<&Path>) -> Result<(), NotifyError> {
        let mut builder = Message::builder()
            .from(self.sender.parse::<Mailbox>()?)
            .subject(compose_subject(report));
        for recipient in &self.recipients {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        let body = compose_body(report);
        let message = match run_log {
            Some(path) => {
                let log = tokio::fs::read(path).await?;
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "run.log".to_string());
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(body))
                        .singlepart(Attachment::new(filename).body(log, ContentType::TEXT_PLAIN)),
                )?
            }
            None => builder.body(body)?,
        };

        self.transport()?.send(message).await?;
        info!(recipients = self.recipients.len(), "change report mailed");
        Ok(())
    }
}
