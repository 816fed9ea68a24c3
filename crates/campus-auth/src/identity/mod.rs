//! Identity context: the single source of truth for the current session.

pub mod context;
pub mod resolver;
pub mod state;
pub mod store;

pub use context::IdentityContext;
pub use resolver::{HttpSessionResolver, ResolvedSession, SessionResolver};
pub use state::{AuthState, Session};
pub use store::{MemoryTokenStore, TokenStore};
