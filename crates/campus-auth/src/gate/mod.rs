//! Access gate: who is allowed to see a protected view.

pub mod decision;
pub mod enforcer;
pub mod guard;
pub mod policies;

pub use decision::{AccessDecision, RedirectTarget};
pub use enforcer::{AccessGate, evaluate};
pub use guard::{DeferredRedirect, Navigator, ViewGuard};
pub use policies::RoutePolicies;
