//! Authentication state.

use chrono::{DateTime, Utc};

use campus_entity::{Principal, SessionToken};

/// A resolved session: who the viewer is and the token that proves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Principal snapshot from this resolution.
    pub principal: Principal,
    /// Bearer token for this session.
    pub token: SessionToken,
    /// When the session was resolved.
    pub resolved_at: DateTime<Utc>,
}

impl Session {
    /// Create a session resolved now.
    pub fn new(principal: Principal, token: SessionToken) -> Self {
        Self {
            principal,
            token,
            resolved_at: Utc::now(),
        }
    }
}

/// Current authentication state of the viewer.
///
/// Starts as `Unresolved` and never returns to it once resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    /// Session resolution has not completed yet.
    #[default]
    Unresolved,
    /// A principal is signed in.
    Authenticated(Session),
    /// No one is signed in.
    Unauthenticated,
}

impl AuthState {
    /// Whether resolution has completed.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    /// Whether a principal is signed in.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// The signed-in principal, if any.
    pub fn principal(&self) -> Option<&Principal> {
        self.session().map(|s| &s.principal)
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Authenticated(_) => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}
