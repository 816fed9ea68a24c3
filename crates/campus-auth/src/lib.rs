//! # campus-auth
//!
//! Session-gated access boundary for the campus portal.
//!
//! ## Modules
//!
//! - `identity` — the shared [`AuthState`], session resolution and token storage
//! - `gate` — role-based access decisions, route policies and view guards

pub mod gate;
pub mod identity;

pub use gate::{AccessDecision, AccessGate, Navigator, RedirectTarget, RoutePolicies, ViewGuard};
pub use identity::{
    AuthState, HttpSessionResolver, IdentityContext, MemoryTokenStore, ResolvedSession, Session,
    SessionResolver, TokenStore,
};
