use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{ChangeNotifier, NotifyError, compose_body, compose_subject};
use crate::core::report::RunReport;

/// Posts the run report as JSON to a webhook URL. The payload's `text` field
/// is Slack-compatible; the rest carries the structured counts.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    fn format_payload(&self, report: &RunReport) -> serde_json::Value {
        json!({
            "text": format!("*{}*\n{}", compose_subject(report), compose_body(report)),
            "run_id": report.run_id.to_string(),
            "date": report.date.format("%Y-%m-%d").to_string(),
            "changes": report.changes.len(),
            "capture_errors": report.capture_errors.len(),
            "store_errors": report.store_errors.len(),
            "purged": report.purged_keys.len(),
        })
    }
}

#[async_trait]
impl ChangeNotifier for WebhookNotifier {
    async fn notify(&self, report: &RunReport, _run_log: Option<&Path>) -> Result<(), NotifyError> {
        let payload = self.format_payload(report);
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        info!("change report posted to webhook");
        Ok(())
    }
}
