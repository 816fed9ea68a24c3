//! # campus-realtime
//!
//! Realtime channel for the campus portal. Provides:
//!
//! - A [`ChannelManager`] owning at most one live connection, keyed by the
//!   session scope (token, college, department, roles)
//! - Reconnect with exponential backoff and epoch-scoped event handlers
//! - WebSocket and in-memory transports
//! - A [`RealtimeContext`] that follows the identity context's login/logout
//! - Presence tracking from channel events

pub mod connection;
pub mod context;
pub mod message;
pub mod presence;
pub mod transport;

pub use connection::key::ScopeKey;
pub use connection::manager::ChannelManager;
pub use connection::state::{ChannelEvent, ChannelFailure, ChannelState, ChannelStatus, DisconnectReason};
pub use context::{ListenerId, RealtimeContext};
pub use message::Envelope;
pub use presence::PresenceTracker;
