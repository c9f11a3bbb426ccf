//! genwatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::progress::DEFAULT_MAX_ATTEMPTS;

/// Placeholder substituted with the session id in endpoint paths
pub const SESSION_PLACEHOLDER: &str = "{session}";

/// Main genwatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend endpoints
    pub server: ServerConfig,

    /// Progress stream behavior
    pub stream: StreamConfig,

    /// Terminal rendering
    pub display: DisplayConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.server.base_url)
            .context(format!("Invalid server base-url '{}'", self.server.base_url))?;

        for (name, path) in [
            ("start-path", &self.server.start_path),
            ("stream-path", &self.server.stream_path),
        ] {
            if !path.contains(SESSION_PLACEHOLDER) {
                return Err(eyre::eyre!("server {} must contain {}", name, SESSION_PLACEHOLDER));
            }
        }

        if self.stream.stall_timeout_ms == 0 {
            return Err(eyre::eyre!("stream stall-timeout-ms must be positive"));
        }
        if self.stream.retry_factor < 1.0 {
            return Err(eyre::eyre!("stream retry-factor must be at least 1.0"));
        }
        if self.display.max_attempts == 0 {
            return Err(eyre::eyre!("display max-attempts must be positive"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .genwatch.yml
        let local_config = PathBuf::from(".genwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/genwatch/genwatch.yml
        if let Some(user_config) = user_config_path()
            && user_config.exists()
        {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed: a broken config file is reported properly by
    /// [`Config::load`] once logging exists.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => [Some(PathBuf::from(".genwatch.yml")), user_config_path()]
                .into_iter()
                .flatten()
                .collect(),
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("genwatch").join("genwatch.yml"))
}

/// Backend endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Backend base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Path that starts generation (POST); `{session}` is substituted
    #[serde(rename = "start-path")]
    pub start_path: String,

    /// Path of the SSE progress stream (GET); `{session}` is substituted
    #[serde(rename = "stream-path")]
    pub stream_path: String,

    /// Timeout for the start request in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            start_path: "/sessions/{session}/generate".to_string(),
            stream_path: "/sessions/{session}/generate/stream".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ServerConfig {
    fn url_for(&self, path: &str, session_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            path.replace(SESSION_PLACEHOLDER, session_id)
        )
    }

    /// Full URL of the start-generation endpoint
    pub fn start_url(&self, session_id: &str) -> String {
        self.url_for(&self.start_path, session_id)
    }

    /// Full URL of the progress stream
    pub fn stream_url(&self, session_id: &str) -> String {
        self.url_for(&self.stream_path, session_id)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Progress stream behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Silence after which the stream is flagged as possibly stalled
    #[serde(rename = "stall-timeout-ms")]
    pub stall_timeout_ms: u64,

    /// First reconnect delay in milliseconds
    #[serde(rename = "retry-start-ms")]
    pub retry_start_ms: u64,

    /// Multiplier applied to the reconnect delay after each failure
    #[serde(rename = "retry-factor")]
    pub retry_factor: f64,

    /// Reconnect attempts before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stall_timeout_ms: 15_000,
            retry_start_ms: 500,
            retry_factor: 2.0,
            max_retries: 5,
        }
    }
}

impl StreamConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn retry_start(&self) -> Duration {
        Duration::from_millis(self.retry_start_ms)
    }
}

/// Terminal rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Shown as "attempt N of M"; the backend enforces the real limit
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Colorize terminal output
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            color: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.base_url, "http://localhost:8000");
        assert_eq!(config.stream.stall_timeout_ms, 15_000);
        assert_eq!(config.display.max_attempts, 3);
        assert!(config.log_level.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
server:
  base-url: https://gen.example.com/api/
  start-path: /v2/{session}/start
  stream-path: /v2/{session}/events
  timeout-ms: 5000

stream:
  stall-timeout-ms: 3000
  retry-start-ms: 100
  retry-factor: 1.5
  max-retries: 2

display:
  max-attempts: 5
  color: false

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.server.start_url("abc"), "https://gen.example.com/api/v2/abc/start");
        assert_eq!(config.server.stream_url("abc"), "https://gen.example.com/api/v2/abc/events");
        assert_eq!(config.server.timeout(), Duration::from_millis(5000));
        assert_eq!(config.stream.stall_timeout(), Duration::from_millis(3000));
        assert_eq!(config.stream.max_retries, 2);
        assert_eq!(config.display.max_attempts, 5);
        assert!(!config.display.color);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
stream:
  stall-timeout-ms: 1000
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.stream.stall_timeout_ms, 1000);

        // Defaults for unspecified
        assert_eq!(config.stream.max_retries, 5);
        assert_eq!(config.server.stream_url("s1"), "http://localhost:8000/sessions/s1/generate/stream");
        assert_eq!(config.display.max_attempts, 3);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.server.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.stream_path = "/stream".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.stall_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.stream.retry_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.display.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path_and_log_level() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("genwatch.yml");
        fs::write(&path, "log-level: WARN\nserver:\n  base-url: http://10.0.0.1:9000\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.base_url, "http://10.0.0.1:9000");
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("WARN"));
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
        assert!(Config::load_log_level(Some(&path)).is_none());
    }
}
