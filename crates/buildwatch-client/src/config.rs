//! Tracker connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default server when `BUILDWATCH_SERVER` is unset.
pub const DEFAULT_SERVER: &str = "http://jenkins";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Build tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker base URL, without trailing slash
    pub server_url: String,
    /// User for authenticated calls (triggering builds)
    pub username: Option<String>,
    /// API token or password paired with `username`
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let timeout_secs = std::env::var("BUILDWATCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        TrackerConfig {
            server_url: normalize(
                &std::env::var("BUILDWATCH_SERVER").unwrap_or_else(|_| DEFAULT_SERVER.to_string()),
            ),
            username: std::env::var("BUILDWATCH_USER").ok(),
            token: std::env::var("BUILDWATCH_TOKEN").ok(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl TrackerConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific server
    pub fn new(server_url: &str) -> Self {
        TrackerConfig {
            server_url: normalize(server_url),
            username: None,
            token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Point at another server, keeping credentials and timeout
    pub fn with_server(mut self, server_url: &str) -> Self {
        self.server_url = normalize(server_url);
        self
    }

    /// Set credentials used for authenticated calls
    pub fn with_credentials(mut self, username: &str, token: &str) -> Self {
        self.username = Some(username.to_string());
        self.token = Some(token.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
