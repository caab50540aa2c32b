use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::utils::constants::{
    DEFAULT_BASE_URL, DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_LOGIN_PATH, DEFAULT_RENEWAL_PATH,
    DEFAULT_SESSION_FILE,
};

/// ================================
/// Full client configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub logging: Option<LoggingConfig>,
}

/// ================================
/// REST API settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// e.g. `http://localhost:8000/api`, request paths are appended verbatim
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// ceiling for every request, renewal included
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_renewal_path")]
    pub renewal_path: String,
    /// where the shell should navigate once the session is gone
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            renewal_path: default_renewal_path(),
            login_path: default_login_path(),
        }
    }
}

/// ================================
/// Persisted session
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SessionConfig {
    pub path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
            PathBuf::from(home).join(DEFAULT_SESSION_FILE)
        })
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::Compact)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}

fn default_renewal_path() -> String {
    DEFAULT_RENEWAL_PATH.to_owned()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_owned()
}
