use std::path::Path;

use super::{AppConfig, ConfigError};

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&content)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Priority;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_missing_config() {
        let result = load_config("/nonexistent/config.yaml");
        assert!(matches!(result.unwrap_err(), ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_config_invalid_yaml() {
        let file = write_config("invalid: yaml: content: [");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_valid() {
        let file = write_config(
            r#"
server:
  port: 8066
  host: "127.0.0.1"

upstream:
  url: "https://api.anthropic.com"
  buffered:
    connect_seconds: 5
    total_seconds: 30

notify:
  topic: "proxy-alerts"
  server: "https://ntfy.example.com"
  priority: high
  title: "Claude Proxy"
  tags: ["warning"]
"#,
        );

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 8066);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.upstream.base_url(), "https://api.anthropic.com");
        assert_eq!(config.upstream.buffered.connect_seconds, 5);
        assert_eq!(config.upstream.buffered.total_seconds, 30);
        // Untouched sections keep their defaults
        assert_eq!(config.upstream.streaming.total_seconds, 300);
        assert_eq!(config.notify.topic(), Some("proxy-alerts"));
        assert_eq!(config.notify.priority, Priority::High);
        assert_eq!(config.notify.tags, vec!["warning".to_string()]);
        assert_eq!(config.notify.timeout_seconds, 10);
    }

    #[test]
    fn test_load_config_minimal() {
        let file = write_config("{}");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(!config.notify.is_configured());
    }

    #[test]
    fn test_config_from_file() {
        let result = AppConfig::from_file("/nonexistent/path.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_with_path_applies_validation() {
        let file = write_config("notify:\n  timeout_seconds: 0\n");
        let result = AppConfig::load(Some(file.path()));
        assert!(result.is_err());
    }
}
