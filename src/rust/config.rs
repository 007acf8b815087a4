use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;

/// Base URL used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:5001/api";

/// Default HTTP request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_URL_VAR: &str = "MPCLASSIFY_API_URL";
const HOME_VAR: &str = "MPCLASSIFY_HOME";
const TIMEOUT_VAR: &str = "MPCLASSIFY_TIMEOUT_SECS";

/// Settings for [`ApiClient`](crate::ApiClient) and the session file
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, e.g. `http://localhost:5001/api`
    pub api_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Where the session is persisted
    pub session_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            session_path: Self::default_home_dir().join("session.json"),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `MPCLASSIFY_API_URL` and
    /// `MPCLASSIFY_TIMEOUT_SECS` when they are set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var(API_URL_VAR) {
            if !url.trim().is_empty() {
                config.api_url = url.trim().to_string();
            }
        }
        if let Ok(secs) = env::var(TIMEOUT_VAR) {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!("Ignoring invalid {}={:?}", TIMEOUT_VAR, secs),
            }
        }
        config
    }

    /// Returns the directory local state is kept in
    pub fn default_home_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var(HOME_VAR) {
            return PathBuf::from(path);
        }

        // 2. Use platform-specific config directory
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("mpclassify");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".config").join("mpclassify");
        }

        // 4. If all else fails, use system temp directory
        env::temp_dir().join("mpclassify")
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }

    /// Joins `path` onto the base URL with exactly one slash between them
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
