//! Channel state machine values and lifecycle events.

use serde::{Deserialize, Serialize};

/// Connection state of the channel manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No connection (initial and terminal).
    Disconnected,
    /// Initial handshake in progress.
    Connecting,
    /// Live.
    Connected,
    /// Link dropped; retrying with backoff.
    Reconnecting,
}

impl ChannelState {
    /// Whether a connection exists or is being established.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Returns the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Snapshot published on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Current state.
    pub state: ChannelState,
    /// Transport instance handlers are bound to.
    pub epoch: u64,
    /// Connect/disconnect request the state belongs to.
    pub(crate) generation: u64,
}

impl ChannelStatus {
    pub(crate) fn initial() -> Self {
        Self {
            state: ChannelState::Disconnected,
            epoch: 0,
            generation: 0,
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    ClientRequested,
    /// A connect with a different scope key replaced it.
    Superseded,
    /// The initial handshake failed.
    HandshakeFailed,
    /// Reconnect attempts ran out.
    RetriesExhausted,
}

/// Severity of a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFailure {
    /// One attempt failed.
    Failed,
    /// The retry budget is exhausted.
    Fatal,
}

/// Lifecycle events broadcast by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A new connection is being opened.
    Connecting {
        /// Epoch of the new transport instance.
        epoch: u64,
    },
    /// The connection is live.
    Connected {
        /// Epoch handlers must be registered on.
        epoch: u64,
    },
    /// The link dropped and a reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Epoch of the replacement transport instance.
        epoch: u64,
    },
    /// The connection ended.
    Disconnected {
        /// Why.
        reason: DisconnectReason,
    },
    /// A connection attempt failed.
    Error {
        /// Whether retries remain.
        failure: ChannelFailure,
        /// Error description.
        message: String,
    },
}
