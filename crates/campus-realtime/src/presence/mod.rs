//! Online presence built from channel events.

pub mod tracker;

pub use tracker::{OFFLINE_EVENT, ONLINE_EVENT, OnlineUser, PresenceTracker, SNAPSHOT_EVENT};
