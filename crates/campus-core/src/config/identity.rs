//! Session resolution endpoint configuration.

use serde::{Deserialize, Serialize};

/// Where and how the identity context resolves the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base address of the portal backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the session-resolution endpoint.
    #[serde(default = "default_session_path")]
    pub session_path: String,
    /// Path of the logout endpoint.
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl IdentityConfig {
    /// Full URL of the session-resolution endpoint.
    pub fn session_url(&self) -> String {
        join_url(&self.base_url, &self.session_path)
    }

    /// Full URL of the logout endpoint.
    pub fn logout_url(&self) -> String {
        join_url(&self.base_url, &self.logout_path)
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_path: default_session_path(),
            logout_path: default_logout_path(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_session_path() -> String {
    "/api/auth/session".to_string()
}

fn default_logout_path() -> String {
    "/api/auth/logout".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
