//! Integration tests for the channel manager against the in-memory transport.

mod helpers;

use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use campus_realtime::{ChannelEvent, ChannelFailure, ChannelState, DisconnectReason};

use helpers::{TestChannel, eventually, key, received, recorder};

#[tokio::test]
async fn test_connect_dispatches_inbound_events() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    assert_eq!(channel.manager.state(), ChannelState::Connecting);

    let (handler, mut rx) = recorder();
    let id = channel.manager.on("notice:new", handler);
    assert!(id.is_some());

    assert_eq!(channel.next_event().await, ChannelEvent::Connecting { epoch: 1 });
    assert_eq!(channel.next_event().await, ChannelEvent::Connected { epoch: 1 });
    assert!(channel.manager.is_connected());

    let peer = channel.accept().await;
    assert_eq!(peer.key, key("t1", "CSE"));
    assert!(peer.emit("notice:new", json!({ "title": "Exam schedule" })));
    assert_eq!(received(&mut rx).await["title"], "Exam schedule");
}

#[tokio::test]
async fn test_on_without_connection_is_rejected() {
    let channel = TestChannel::new();
    let (handler, _rx) = recorder();
    assert!(channel.manager.on("notice:new", handler).is_none());
    assert_eq!(channel.manager.handler_count(), 0);
}

#[tokio::test]
async fn test_off_stops_delivery() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    let (handler, mut rx) = recorder();
    let (kept, mut kept_rx) = recorder();
    let id = channel.manager.on("notice:new", handler).unwrap();
    channel.manager.on("notice:new", kept).unwrap();

    channel.wait_for_state(ChannelState::Connected).await;
    let peer = channel.accept().await;

    assert!(channel.manager.off("notice:new", id));
    assert!(!channel.manager.off("notice:new", id));

    peer.emit("notice:new", json!(1));
    assert_eq!(received(&mut kept_rx).await, json!(1));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_new_scope_replaces_connection() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let first = channel.accept().await;
    let (handler, _rx) = recorder();
    channel.manager.on("notice:new", handler).unwrap();
    channel.drain_events();

    channel.manager.connect(key("t1", "ECE"));
    assert_eq!(channel.manager.handler_count(), 0);
    assert_eq!(
        channel.next_event().await,
        ChannelEvent::Disconnected {
            reason: DisconnectReason::Superseded
        }
    );
    assert_eq!(channel.next_event().await, ChannelEvent::Connecting { epoch: 2 });
    assert_eq!(channel.next_event().await, ChannelEvent::Connected { epoch: 2 });

    let second = channel.accept().await;
    assert_eq!(second.key, key("t1", "ECE"));
    assert!(!first.is_open());
    assert_eq!(channel.server.live_links(), 1);
    assert_eq!(channel.server.peak_live_links(), 1);
    assert_eq!(channel.manager.current_key(), Some(key("t1", "ECE")));
}

#[tokio::test]
async fn test_connect_after_disconnect_waits_for_slow_close() {
    let mut channel = TestChannel::new();
    channel.server.delay_close(Duration::from_millis(100));
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let first = channel.accept().await;

    channel.manager.disconnect();
    channel.manager.connect(key("t2", "CSE"));
    assert_eq!(channel.manager.state(), ChannelState::Connecting);

    channel.wait_for_state(ChannelState::Connected).await;
    let second = channel.accept().await;
    assert_eq!(second.key, key("t2", "CSE"));
    assert!(!first.is_open());
    assert_eq!(channel.server.live_links(), 1);
    assert_eq!(channel.server.peak_live_links(), 1);
}

#[tokio::test]
async fn test_shutdown_waits_for_disconnected_link() {
    let mut channel = TestChannel::new();
    channel.server.delay_close(Duration::from_millis(50));
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let peer = channel.accept().await;

    channel.manager.disconnect();
    channel.manager.shutdown().await;

    assert_eq!(channel.server.live_links(), 0);
    assert!(!peer.is_open());
}

#[tokio::test]
async fn test_same_scope_connect_is_noop() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let _peer = channel.accept().await;
    let (handler, _rx) = recorder();
    channel.manager.on("notice:new", handler).unwrap();
    channel.drain_events();

    channel.manager.connect(key("t1", "CSE"));

    assert_eq!(channel.manager.state(), ChannelState::Connected);
    assert_eq!(channel.manager.handler_count(), 1);
    assert_eq!(channel.server.opened(), 1);
    assert!(channel.drain_events().is_empty());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let mut channel = TestChannel::new();
    channel.manager.disconnect();
    assert_eq!(channel.manager.state(), ChannelState::Disconnected);
    assert!(channel.drain_events().is_empty());

    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let peer = channel.accept().await;
    channel.drain_events();

    channel.manager.disconnect();
    channel.manager.disconnect();

    assert_eq!(channel.manager.state(), ChannelState::Disconnected);
    assert_eq!(channel.manager.current_key(), None);
    assert_eq!(
        channel.drain_events(),
        vec![ChannelEvent::Disconnected {
            reason: DisconnectReason::ClientRequested
        }]
    );
    eventually(|| !peer.is_open()).await;
    assert_eq!(channel.server.live_links(), 0);
}

#[tokio::test]
async fn test_disconnect_before_handshake_never_connects() {
    let mut channel = TestChannel::new();
    channel.server.hold_handshakes();

    channel.manager.connect(key("t1", "CSE"));
    let server = &channel.server;
    eventually(|| server.opened() == 1).await;

    channel.manager.disconnect();
    channel.server.release_handshakes(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(channel.manager.state(), ChannelState::Disconnected);
    assert_eq!(
        channel.drain_events(),
        vec![
            ChannelEvent::Connecting { epoch: 1 },
            ChannelEvent::Disconnected {
                reason: DisconnectReason::ClientRequested
            },
        ]
    );
    assert!(
        timeout(Duration::from_millis(50), channel.server.accept())
            .await
            .is_err()
    );
    assert_eq!(channel.server.live_links(), 0);
}

#[tokio::test]
async fn test_dropped_link_reconnects_on_new_epoch() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let first = channel.accept().await;
    let (handler, _rx) = recorder();
    channel.manager.on("notice:new", handler).unwrap();
    channel.drain_events();

    drop(first);

    assert_eq!(
        channel.next_event().await,
        ChannelEvent::Reconnecting {
            attempt: 1,
            epoch: 2
        }
    );
    assert_eq!(channel.next_event().await, ChannelEvent::Connected { epoch: 2 });

    let second = channel.accept().await;
    assert_eq!(second.key, key("t1", "CSE"));
    assert_eq!(channel.manager.status().epoch, 2);
    assert_eq!(channel.manager.handler_count(), 0);
    assert_eq!(channel.server.opened(), 2);
}

#[tokio::test]
async fn test_reconnect_survives_refused_attempts() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let first = channel.accept().await;
    channel.drain_events();

    channel.server.refuse_next(1);
    drop(first);

    assert!(matches!(
        channel.next_event().await,
        ChannelEvent::Reconnecting { attempt: 1, .. }
    ));
    assert!(matches!(
        channel.next_event().await,
        ChannelEvent::Error {
            failure: ChannelFailure::Failed,
            ..
        }
    ));
    assert!(matches!(
        channel.next_event().await,
        ChannelEvent::Reconnecting { attempt: 2, .. }
    ));
    assert!(matches!(
        channel.next_event().await,
        ChannelEvent::Connected { .. }
    ));
}

#[tokio::test]
async fn test_exhausted_retries_end_disconnected() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let first = channel.accept().await;
    channel.drain_events();

    channel.server.refuse_next(10);
    drop(first);

    let mut events = Vec::new();
    loop {
        let event = channel.next_event().await;
        let done = matches!(event, ChannelEvent::Disconnected { .. });
        events.push(event);
        if done {
            break;
        }
    }

    let reconnecting = events
        .iter()
        .filter(|e| matches!(e, ChannelEvent::Reconnecting { .. }))
        .count();
    assert_eq!(reconnecting, 3);
    assert!(matches!(
        events[events.len() - 2],
        ChannelEvent::Error {
            failure: ChannelFailure::Fatal,
            ..
        }
    ));
    assert_eq!(
        events.last(),
        Some(&ChannelEvent::Disconnected {
            reason: DisconnectReason::RetriesExhausted
        })
    );
    assert_eq!(channel.manager.state(), ChannelState::Disconnected);
    assert_eq!(channel.server.opened(), 4);
}

#[tokio::test]
async fn test_initial_handshake_failure_does_not_retry() {
    let mut channel = TestChannel::new();
    channel.server.refuse_next(1);

    channel.manager.connect(key("t1", "CSE"));

    assert_eq!(channel.next_event().await, ChannelEvent::Connecting { epoch: 1 });
    assert!(matches!(
        channel.next_event().await,
        ChannelEvent::Error {
            failure: ChannelFailure::Failed,
            ..
        }
    ));
    assert_eq!(
        channel.next_event().await,
        ChannelEvent::Disconnected {
            reason: DisconnectReason::HandshakeFailed
        }
    );
    assert_eq!(channel.server.opened(), 1);
}

#[tokio::test]
async fn test_emit_reaches_server() {
    let mut channel = TestChannel::new();
    assert!(!channel.manager.emit("presence:ping", json!({})));

    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let mut peer = channel.accept().await;

    assert!(channel.manager.emit("presence:ping", json!({ "at": 1 })));
    let frame = timeout(helpers::WAIT, peer.next_frame())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.event, "presence:ping");
    assert_eq!(frame.data["at"], 1);
}

#[tokio::test]
async fn test_shutdown_releases_transport() {
    let mut channel = TestChannel::new();
    channel.manager.connect(key("t1", "CSE"));
    channel.wait_for_state(ChannelState::Connected).await;
    let peer = channel.accept().await;

    channel.manager.shutdown().await;

    assert_eq!(channel.manager.state(), ChannelState::Disconnected);
    assert_eq!(channel.server.live_links(), 0);
    assert!(!peer.is_open());
}
