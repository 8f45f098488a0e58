mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::notify::Priority;

pub use loader::load_config;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Largest inbound body the proxy will buffer before forwarding
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_body_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upstream API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL every proxied path is appended to
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Timeouts for requests whose response is read in one piece
    #[serde(default = "TimeoutConfig::buffered")]
    pub buffered: TimeoutConfig,
    /// Timeouts for `"stream": true` requests
    #[serde(default = "TimeoutConfig::streaming")]
    pub streaming: TimeoutConfig,
}

fn default_upstream_url() -> String {
    "https://api.z.ai/api/anthropic".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            buffered: TimeoutConfig::buffered(),
            streaming: TimeoutConfig::streaming(),
        }
    }
}

impl UpstreamConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }
}

/// Connect and total deadlines for one upstream client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutConfig {
    pub connect_seconds: u64,
    pub total_seconds: u64,
}

impl TimeoutConfig {
    pub fn buffered() -> Self {
        Self {
            connect_seconds: 60,
            total_seconds: 120,
        }
    }

    pub fn streaming() -> Self {
        Self {
            connect_seconds: 10,
            total_seconds: 300,
        }
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_seconds)
    }

    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_seconds)
    }
}

/// ntfy push notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// Topic to publish to; notifications are disabled when unset
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default = "default_ntfy_server")]
    pub server: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_seconds: u64,
}

fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

fn default_notify_timeout() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            topic: None,
            server: default_ntfy_server(),
            priority: Priority::default(),
            title: None,
            tags: Vec::new(),
            timeout_seconds: default_notify_timeout(),
        }
    }
}

impl NotifyConfig {
    /// Returns the topic if one is set and non-empty
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.topic().is_some()
    }

    /// Full publish URL, `{server}/{topic}`
    pub fn endpoint(&self) -> Option<String> {
        self.topic()
            .map(|topic| format!("{}/{}", self.server.trim_end_matches('/'), topic))
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load the file if one was given, otherwise start from defaults, then
    /// apply process environment overrides
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `BASE_URL`, `NTFY_TOPIC` and `NTFY_SERVER` overrides
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASE_URL") {
            self.upstream.url = url;
        }
        if let Some(topic) = lookup("NTFY_TOPIC") {
            // An empty topic explicitly disables notifications
            self.notify.topic = Some(topic).filter(|t| !t.is_empty());
        }
        if let Some(server) = lookup("NTFY_SERVER") {
            self.notify.server = server;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("upstream.url", &self.upstream.url)?;
        if self.notify.is_configured() {
            validate_http_url("notify.server", &self.notify.server)?;
        }

        for (name, timeouts) in [
            ("upstream.buffered", &self.upstream.buffered),
            ("upstream.streaming", &self.upstream.streaming),
        ] {
            if timeouts.connect_seconds == 0 || timeouts.total_seconds == 0 {
                return Err(ConfigError::Validation(format!(
                    "{} timeouts must be non-zero",
                    name
                )));
            }
        }
        if self.notify.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "notify.timeout_seconds must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ConfigError::Validation(format!("{} is not a valid URL ({}): {}", field, value, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
