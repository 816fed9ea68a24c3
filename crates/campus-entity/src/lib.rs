//! # campus-entity
//!
//! Identity models shared by the gate and the realtime channel: the
//! authenticated [`Principal`], its closed [`Role`] set and the opaque
//! [`SessionToken`].

pub mod principal;

pub use principal::{Principal, PrincipalId, Role, RoleSet, SessionToken};
