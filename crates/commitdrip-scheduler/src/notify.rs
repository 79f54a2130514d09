//! Notifier implementations.

use async_trait::async_trait;
use commitdrip_core::{Error, Notification, NotificationKind, Notifier, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Writes every notification as a structured log line.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        match n.kind {
            NotificationKind::CommitFailed | NotificationKind::JobFailed => warn!(
                kind = n.kind.as_str(),
                job_id = %n.job_id,
                repo = %n.repo,
                message = n.message.as_deref().unwrap_or(""),
                error = n.error.as_deref().unwrap_or(""),
                "{}",
                n.subject()
            ),
            _ => info!(
                kind = n.kind.as_str(),
                job_id = %n.job_id,
                repo = %n.repo,
                message = n.message.as_deref().unwrap_or(""),
                completed = n.completed_commits,
                total = n.total_commits,
                "{}",
                n.subject()
            ),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// POSTs each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("commitdrip")
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            subject: notification.subject(),
            notification,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!(
                "webhook returned {}: {}",
                status, text
            )));
        }

        Ok(())
    }
}

/// Delivers to every inner notifier, reporting the first failure.
pub struct FanoutNotifier {
    targets: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(targets: Vec<Arc<dyn Notifier>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.notify(notification).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
