//! Shared helpers for realtime integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use campus_auth::Session;
use campus_core::config::{RealtimeConfig, ReconnectConfig};
use campus_entity::{Principal, Role, RoleSet, SessionToken};
use campus_realtime::transport::{MemoryPeer, MemoryServer, MemoryTransport};
use campus_realtime::{ChannelEvent, ChannelManager, ChannelState, ScopeKey};
use serde_json::Value;

/// How long any single wait may take before the test fails.
pub const WAIT: Duration = Duration::from_secs(2);

/// A manager wired to an in-memory server.
pub struct TestChannel {
    pub manager: Arc<ChannelManager>,
    pub server: MemoryServer,
    pub events: broadcast::Receiver<ChannelEvent>,
}

impl TestChannel {
    /// Create a manager with fast reconnects.
    pub fn new() -> Self {
        let (transport, server) = MemoryTransport::pair();
        let manager = Arc::new(
            ChannelManager::new(test_config(), Arc::new(transport)).expect("inside a runtime"),
        );
        let events = manager.subscribe_events();
        Self {
            manager,
            server,
            events,
        }
    }

    /// Next lifecycle event.
    pub async fn next_event(&mut self) -> ChannelEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a channel event")
            .expect("event stream closed")
    }

    /// Events already broadcast, without waiting.
    pub fn drain_events(&mut self) -> Vec<ChannelEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Next link the server sees.
    pub async fn accept(&mut self) -> MemoryPeer {
        timeout(WAIT, self.server.accept())
            .await
            .expect("timed out waiting for a link")
            .expect("transport dropped")
    }

    /// Waits until the manager reaches `state`.
    pub async fn wait_for_state(&self, state: ChannelState) {
        let mut status = self.manager.subscribe_status();
        timeout(WAIT, status.wait_for(|s| s.state == state))
            .await
            .expect("timed out waiting for channel state")
            .expect("manager dropped");
    }
}

/// Reconnect quickly and give up after three attempts.
pub fn test_config() -> RealtimeConfig {
    RealtimeConfig {
        url: "memory://test".to_string(),
        handshake_timeout_seconds: 5,
        event_buffer_size: 64,
        outbound_buffer_size: 16,
        reconnect: ReconnectConfig {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 40,
            multiplier: 2.0,
        },
    }
}

pub fn student() -> Principal {
    Principal::new("s1", RoleSet::from([Role::Student])).with_scope(Some("c1"), Some("CSE"))
}

pub fn session(token: &str, principal: Principal) -> Session {
    Session::new(principal, SessionToken::new(token))
}

pub fn key(token: &str, department: &str) -> ScopeKey {
    ScopeKey::new(
        SessionToken::new(token),
        Some("c1".to_string()),
        Some(department.to_string()),
        RoleSet::from([Role::Student]),
    )
}

/// Handler that forwards every payload to the returned receiver.
pub fn recorder() -> (
    impl Fn(&Value) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |data: &Value| {
            let _ = tx.send(data.clone());
        },
        rx,
    )
}

/// Next recorded payload.
pub async fn received(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a handler call")
        .expect("handler dropped")
}

/// Polls `check` until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
