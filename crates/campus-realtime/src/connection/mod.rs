//! Connection lifecycle: scope keys, state machine, handlers and the manager.

mod driver;
pub mod handlers;
pub mod key;
pub mod manager;
pub mod state;

pub use handlers::{EventHandler, SubscriptionId};
pub use key::ScopeKey;
pub use manager::ChannelManager;
pub use state::{ChannelEvent, ChannelFailure, ChannelState, ChannelStatus, DisconnectReason};
