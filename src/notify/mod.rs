//! Best-effort push notifications for upstream failures

mod ntfy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NotifyConfig;

pub use ntfy::NtfySink;

/// ntfy message priority
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Min,
    Low,
    Default,
    High,
    #[default]
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Min => "min",
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
    pub priority: Priority,
}

/// Destination that alerts are delivered to
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one alert
    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Name of the sink
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Notification rejected with status {status}")]
    Rejected { status: u16 },

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Handle used by the proxy to raise alerts.
///
/// Delivery failures are logged and dropped; callers never see them.
#[derive(Clone)]
pub struct Notifier {
    sink: Option<Arc<dyn AlertSink>>,
    priority: Priority,
    timeout: Duration,
}

impl Notifier {
    /// A notifier that never sends anything
    pub fn disabled() -> Self {
        Self {
            sink: None,
            priority: Priority::default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::disabled()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build an ntfy-backed notifier, or a disabled one when no topic is set
    pub fn from_config(config: &NotifyConfig) -> Self {
        if !config.is_configured() {
            return Self::disabled();
        }

        match NtfySink::from_config(config) {
            Ok(sink) => Self::new(Arc::new(sink))
                .with_priority(config.priority)
                .with_timeout(Duration::from_secs(config.timeout_seconds)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize ntfy notifier, alerts disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    /// Send `message` at the configured default priority
    pub async fn notify(&self, message: impl Into<String>) {
        self.notify_with_priority(message, self.priority).await
    }

    pub async fn notify_with_priority(&self, message: impl Into<String>, priority: Priority) {
        let Some(sink) = &self.sink else {
            return;
        };

        let alert = Alert {
            message: message.into(),
            priority,
        };

        let result = match tokio::time::timeout(self.timeout, sink.deliver(&alert)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => {
                tracing::debug!(sink = sink.name(), priority = %priority, "Notification sent");
            }
            Err(e) => {
                tracing::warn!(sink = sink.name(), error = %e, "Failed to send notification");
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("sink", &self.sink.as_ref().map(|s| s.name().to_string()))
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .finish()
    }
}
