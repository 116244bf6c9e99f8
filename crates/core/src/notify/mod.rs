//! Transient user notifications.
//!
//! Components never talk to a global toast queue. They receive a
//! [`NotificationSink`] and push [`Notification`]s into it; the [`Notifier`]
//! facade fans out to every configured sink (tracing, Slack) and logs
//! delivery failures without aborting.

pub mod slack;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::NotificationConfig;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A non-blocking, transient message for the user.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
        }
    }
}

/// Anything that can display or forward a notification. Delivery must not
/// block and must not fail the caller.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: Notification) {
        match n.level {
            Level::Info | Level::Success => info!(level = %n.level, "{}", n.message),
            Level::Warning => warn!("{}", n.message),
            Level::Error => error!("{}", n.message),
        }
    }
}

/// Keeps every notification in memory. Used as a test double and by the CLI
/// to print what happened after a command.
#[derive(Debug, Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: Level) -> usize {
        self.notifications()
            .iter()
            .filter(|n| n.level == level)
            .count()
    }

    pub fn take(&self) -> Vec<Notification> {
        self.seen
            .lock()
            .map(|mut v| std::mem::take(&mut *v))
            .unwrap_or_default()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, n: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(n);
        }
    }
}

/// Fan-out to all configured sinks.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Notifier {
    /// Tracing plus the channels enabled in the notification configuration.
    pub fn new(config: &NotificationConfig) -> Self {
        let mut notifier = Self::default().with_sink(Arc::new(TracingSink));
        if let Some(ref url) = config.slack_webhook_url {
            info!("Slack notifications enabled");
            notifier = notifier.with_sink(Arc::new(slack::SlackNotifier::new(url.clone())));
        }
        notifier
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Return whether any sink is attached.
    pub fn is_configured(&self) -> bool {
        !self.sinks.is_empty()
    }
}

impl NotificationSink for Notifier {
    fn notify(&self, n: Notification) {
        for sink in &self.sinks {
            sink.notify(n.clone());
        }
    }
}
