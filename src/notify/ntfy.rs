//! ntfy.sh publisher

use async_trait::async_trait;
use std::time::Duration;

use super::{Alert, AlertSink, NotifyError};
use crate::config::NotifyConfig;

/// Publishes alerts with `POST {server}/{topic}`
pub struct NtfySink {
    client: reqwest::Client,
    endpoint: String,
    title: Option<String>,
    tags: Vec<String>,
    timeout: Duration,
}

impl NtfySink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            title: None,
            tags: Vec::new(),
            timeout,
        })
    }

    /// Create from app config
    pub fn from_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let endpoint = config
            .endpoint()
            .ok_or_else(|| NotifyError::Config("no ntfy topic configured".to_string()))?;

        let mut sink = Self::new(endpoint, Duration::from_secs(config.timeout_seconds))?;
        sink.title = config.title.clone();
        sink.tags = config.tags.clone();
        Ok(sink)
    }
}

#[async_trait]
impl AlertSink for NtfySink {
    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Priority", alert.priority.as_str())
            .body(alert.message.clone().into_bytes());

        if let Some(ref title) = self.title {
            request = request.header("Title", title);
        }
        if !self.tags.is_empty() {
            request = request.header("Tags", self.tags.join(","));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Timeout(self.timeout)
            } else {
                NotifyError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "ntfy"
    }
}
