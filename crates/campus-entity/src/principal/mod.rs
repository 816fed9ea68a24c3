//! Authenticated identity models.

pub mod model;
pub mod role;
pub mod token;

pub use model::{Principal, PrincipalId};
pub use role::{Role, RoleSet};
pub use token::SessionToken;
