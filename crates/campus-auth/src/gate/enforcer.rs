//! Access gate enforcement — decides render / redirect / pending.

use campus_core::config::GateConfig;
use campus_entity::RoleSet;

use crate::identity::AuthState;

use super::decision::{AccessDecision, RedirectTarget};
use super::policies::RoutePolicies;

/// Decides whether the current viewer may render a view requiring `required`.
///
/// A pure function of its inputs:
///
/// - `Unresolved` → `Pending` (no redirect while the session loads)
/// - `Unauthenticated` → redirect to login
/// - no role in common with `required` → redirect to forbidden
/// - otherwise → `Allow`
///
/// An empty `required` set never intersects and therefore denies.
pub fn evaluate(required: &RoleSet, state: &AuthState) -> AccessDecision {
    match state {
        AuthState::Unresolved => AccessDecision::Pending,
        AuthState::Unauthenticated => AccessDecision::Redirect(RedirectTarget::Login),
        AuthState::Authenticated(session) => {
            if session.principal.has_any_role(required) {
                AccessDecision::Allow
            } else {
                AccessDecision::Redirect(RedirectTarget::Forbidden)
            }
        }
    }
}

/// Access gate shared by every protected view.
#[derive(Debug, Clone)]
pub struct AccessGate {
    /// Redirect routes.
    config: GateConfig,
    /// Route protection table.
    policies: RoutePolicies,
}

impl AccessGate {
    /// Creates a gate with the default route table.
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            policies: RoutePolicies::new(),
        }
    }

    /// Creates a gate with a custom route table.
    pub fn with_policies(config: GateConfig, policies: RoutePolicies) -> Self {
        Self { config, policies }
    }

    /// Evaluates the gate for an explicit role requirement.
    pub fn evaluate(&self, required: &RoleSet, state: &AuthState) -> AccessDecision {
        evaluate(required, state)
    }

    /// Evaluates the gate for a route using the policy table.
    ///
    /// Unprotected routes are always allowed, even before resolution.
    pub fn evaluate_route(&self, path: &str, state: &AuthState) -> AccessDecision {
        match self.policies.required_roles(path) {
            Some(required) => evaluate(required, state),
            None => AccessDecision::Allow,
        }
    }

    /// Route a redirect target navigates to.
    pub fn redirect_path(&self, target: RedirectTarget) -> &str {
        match target {
            RedirectTarget::Login => &self.config.login_route,
            RedirectTarget::Forbidden => &self.config.forbidden_route,
        }
    }

    /// Gate configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Returns a reference to the route table.
    pub fn policies(&self) -> &RoutePolicies {
        &self.policies
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(GateConfig::default())
    }
}
