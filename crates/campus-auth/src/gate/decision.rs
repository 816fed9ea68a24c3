//! Access decisions.

use serde::{Deserialize, Serialize};

/// Where a denied viewer is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectTarget {
    /// The login entry point.
    Login,
    /// The forbidden view.
    Forbidden,
}

/// Outcome of evaluating the gate for a protected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Render the view.
    Allow,
    /// Navigate away.
    Redirect(RedirectTarget),
    /// Session not resolved yet; render a neutral placeholder.
    Pending,
}

impl AccessDecision {
    /// Whether the view may render.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The redirect target, if this is a redirect.
    pub fn redirect_target(&self) -> Option<RedirectTarget> {
        match self {
            Self::Redirect(target) => Some(*target),
            _ => None,
        }
    }
}
