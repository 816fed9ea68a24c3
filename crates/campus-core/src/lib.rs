//! # campus-core
//!
//! Core crate for the campus portal. Contains configuration schemas and
//! the unified error system shared by the identity, gate and realtime crates.
//!
//! This crate has **no** internal dependencies on other portal crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::AppError;
pub use result::AppResult;
