//! Access gate configuration.

use serde::{Deserialize, Serialize};

/// Redirect routes and timing used by the access gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Login entry point for unauthenticated viewers.
    #[serde(default = "default_login_route")]
    pub login_route: String,
    /// Forbidden view for authenticated viewers without a matching role.
    #[serde(default = "default_forbidden_route")]
    pub forbidden_route: String,
    /// Delay before a guarded view performs its redirect, in milliseconds.
    #[serde(default)]
    pub redirect_delay_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            login_route: default_login_route(),
            forbidden_route: default_forbidden_route(),
            redirect_delay_ms: 0,
        }
    }
}

fn default_login_route() -> String {
    "/login".to_string()
}

fn default_forbidden_route() -> String {
    "/unauthorized".to_string()
}
