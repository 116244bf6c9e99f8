//! Slack webhook notification sender.
//!
//! Forwards warnings and errors to a Slack channel via an incoming webhook
//! URL. Info and success messages stay local.

use tracing::{debug, info, warn};

use super::{Level, Notification, NotificationSink};
use crate::errors::NotificationError;

/// Slack incoming-webhook notifier.
pub struct SlackNotifier {
    webhook_url: String,
    http: reqwest::Client,
}

impl SlackNotifier {
    /// Create a new Slack notifier targeting the given webhook URL.
    pub fn new(webhook_url: String) -> Self {
        info!("initializing Slack notifier");
        Self {
            webhook_url,
            http: reqwest::Client::new(),
        }
    }
}

/// Post a message to the webhook.
async fn send(http: &reqwest::Client, url: &str, message: &str) -> Result<(), NotificationError> {
    debug!(len = message.len(), "sending Slack message");
    let payload = serde_json::json!({
        "text": message,
        "unfurl_links": false,
        "unfurl_media": false,
    });

    let resp = http
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(NotificationError::HttpError)?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        warn!(status = %status, body = %body, "Slack webhook returned error");
        return Err(NotificationError::SlackError(format!(
            "HTTP {}: {}",
            status, body
        )));
    }

    info!("Slack message sent successfully");
    Ok(())
}

fn format_slack(n: &Notification) -> Option<String> {
    match n.level {
        Level::Warning => Some(format!(":warning: *Timeline Studio*\n{}", n.message)),
        Level::Error => Some(format!(":x: *Timeline Studio*\n```{}```", n.message)),
        Level::Info | Level::Success => None,
    }
}

impl NotificationSink for SlackNotifier {
    /// Fire and forget on the current tokio runtime. Outside a runtime the
    /// message is dropped with a warning.
    fn notify(&self, n: Notification) {
        let Some(message) = format_slack(&n) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, dropping Slack notification");
            return;
        };
        let http = self.http.clone();
        let url = self.webhook_url.clone();
        handle.spawn(async move {
            if let Err(e) = send(&http, &url, &message).await {
                warn!(error = %e, "Slack notification failed");
            }
        });
    }
}
