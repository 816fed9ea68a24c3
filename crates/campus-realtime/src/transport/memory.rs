//! In-memory transport for single-process wiring and tests.
//!
//! Every link opened by [`MemoryTransport`] shows up as a [`MemoryPeer`] on
//! the paired [`MemoryServer`], which can push events, read what the client
//! sent, or drop the link to simulate a network failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};

use campus_core::{AppError, AppResult};

use crate::connection::key::ScopeKey;
use crate::message::Envelope;

use super::{Transport, TransportLink};

#[derive(Debug)]
struct MemoryShared {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    handshakes: Semaphore,
    hold: AtomicBool,
    refusals: AtomicUsize,
    close_delay_ms: AtomicU64,
    opened: AtomicU64,
    live: AtomicUsize,
    peak: AtomicUsize,
}

/// Client side of the in-memory transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    shared: Arc<MemoryShared>,
}

/// Server side of the in-memory transport.
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<MemoryShared>,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryTransport {
    /// Creates a connected transport/server pair.
    pub fn pair() -> (Self, MemoryServer) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(MemoryShared {
            peers: peers_tx,
            handshakes: Semaphore::new(0),
            hold: AtomicBool::new(false),
            refusals: AtomicUsize::new(0),
            close_delay_ms: AtomicU64::new(0),
            opened: AtomicU64::new(0),
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        (
            Self {
                shared: shared.clone(),
            },
            MemoryServer {
                shared,
                peers: peers_rx,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, key: &ScopeKey) -> AppResult<Box<dyn TransportLink>> {
        let shared = &self.shared;
        shared.opened.fetch_add(1, Ordering::SeqCst);

        if shared.hold.load(Ordering::SeqCst) {
            shared
                .handshakes
                .acquire()
                .await
                .map_err(|_| AppError::transport("Memory server shut down"))?
                .forget();
        }

        let refused = shared
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(AppError::transport("Connection refused"));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            key: key.clone(),
            to_client,
            from_client,
        };

        let live = shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak.fetch_max(live, Ordering::SeqCst);
        let link = MemoryLink {
            shared: shared.clone(),
            to_server: Some(to_server),
            from_server,
        };

        shared
            .peers
            .send(peer)
            .map_err(|_| AppError::transport("Memory server shut down"))?;
        Ok(Box::new(link))
    }
}

impl MemoryServer {
    /// Waits for the next opened link.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Makes handshakes wait for [`release_handshakes`](Self::release_handshakes).
    pub fn hold_handshakes(&self) {
        self.shared.hold.store(true, Ordering::SeqCst);
    }

    /// Lets `n` held handshakes complete.
    pub fn release_handshakes(&self, n: usize) {
        self.shared.handshakes.add_permits(n);
    }

    /// Fails the next `n` handshakes.
    pub fn refuse_next(&self, n: usize) {
        self.shared.refusals.fetch_add(n, Ordering::SeqCst);
    }

    /// Makes every client-side close take `delay`, like a slow close handshake.
    ///
    /// The link counts as live until the close completes.
    pub fn delay_close(&self, delay: Duration) {
        self.shared
            .close_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Handshakes attempted so far.
    pub fn opened(&self) -> u64 {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Links currently open.
    pub fn live_links(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of links ever open at once.
    pub fn peak_live_links(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }
}

/// Server's view of one link. Dropping it drops the link.
#[derive(Debug)]
pub struct MemoryPeer {
    /// Scope the link was opened with.
    pub key: ScopeKey,
    to_client: mpsc::UnboundedSender<Envelope>,
    from_client: mpsc::UnboundedReceiver<Envelope>,
}

impl MemoryPeer {
    /// Pushes an event to the client. Returns `false` if the link is gone.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.to_client.send(Envelope::new(event, data)).is_ok()
    }

    /// Next frame the client sent. `None` once the client closed the link.
    pub async fn next_frame(&mut self) -> Option<Envelope> {
        self.from_client.recv().await
    }

    /// Whether the client still holds the link.
    pub fn is_open(&self) -> bool {
        !self.to_client.is_closed()
    }
}

struct MemoryLink {
    shared: Arc<MemoryShared>,
    to_server: Option<mpsc::UnboundedSender<Envelope>>,
    from_server: mpsc::UnboundedReceiver<Envelope>,
}

#[async_trait]
impl TransportLink for MemoryLink {
    async fn send(&mut self, frame: Envelope) -> AppResult<()> {
        match &self.to_server {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| AppError::transport("Peer closed the link")),
            None => Err(AppError::transport("Link already closed")),
        }
    }

    async fn recv(&mut self) -> Option<AppResult<Envelope>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        let delay = self.shared.close_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.to_server = None;
        self.from_server.close();
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use campus_entity::{Role, RoleSet, SessionToken};
    use serde_json::json;

    use super::*;

    fn key() -> ScopeKey {
        ScopeKey::new(SessionToken::new("t1"), None, None, RoleSet::from([Role::Student]))
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut server) = MemoryTransport::pair();
        let mut link = transport.open(&key()).await.unwrap();
        let mut peer = server.accept().await.unwrap();
        assert_eq!(peer.key, key());

        assert!(peer.emit("notice", json!({ "id": 1 })));
        let inbound = link.recv().await.unwrap().unwrap();
        assert_eq!(inbound.event, "notice");

        link.send(Envelope::new("ack", json!(1))).await.unwrap();
        assert_eq!(peer.next_frame().await.unwrap().event, "ack");
    }

    #[tokio::test]
    async fn test_live_count_follows_drop() {
        let (transport, mut server) = MemoryTransport::pair();
        let link = transport.open(&key()).await.unwrap();
        let peer = server.accept().await.unwrap();
        assert_eq!(server.live_links(), 1);

        drop(link);
        assert_eq!(server.live_links(), 0);
        assert!(!peer.is_open());
        assert_eq!(server.peak_live_links(), 1);
    }

    #[tokio::test]
    async fn test_refused_handshake() {
        let (transport, server) = MemoryTransport::pair();
        server.refuse_next(1);
        assert!(transport.open(&key()).await.is_err());
        assert!(transport.open(&key()).await.is_ok());
    }
}
