//! Transports the channel manager opens links with.

pub mod memory;
pub mod ws;

use async_trait::async_trait;

use campus_core::AppResult;

use crate::connection::key::ScopeKey;
use crate::message::Envelope;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use ws::WsTransport;

/// Opens authenticated links to the realtime service.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug + 'static {
    /// Open and authenticate a link for `key`.
    ///
    /// Returning `Ok` means the handshake completed.
    async fn open(&self, key: &ScopeKey) -> AppResult<Box<dyn TransportLink>>;
}

/// One open link. Only the manager's driver ever holds it.
#[async_trait]
pub trait TransportLink: Send + 'static {
    /// Send a frame.
    async fn send(&mut self, frame: Envelope) -> AppResult<()>;

    /// Next inbound frame. `None` once the link is closed.
    ///
    /// Must be cancel-safe.
    async fn recv(&mut self) -> Option<AppResult<Envelope>>;

    /// Close the link and release its resources.
    async fn close(&mut self);
}
