//! Realtime channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Realtime (WebSocket) channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the realtime service.
    #[serde(default = "default_url")]
    pub url: String,
    /// Handshake timeout in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_seconds: u64,
    /// Buffer size of the lifecycle event broadcast channel.
    #[serde(default = "default_buffer")]
    pub event_buffer_size: usize,
    /// Buffer size of the outbound frame queue.
    #[serde(default = "default_buffer")]
    pub outbound_buffer_size: usize,
    /// Reconnect policy after a dropped connection.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            handshake_timeout_seconds: default_handshake_timeout(),
            event_buffer_size: default_buffer(),
            outbound_buffer_size: default_buffer(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Exponential backoff policy for reconnect attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Attempts before the connection is given up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first attempt, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

impl ReconnectConfig {
    /// Delay before the given attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_url() -> String {
    "ws://localhost:5000/ws".to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_buffer() -> usize {
    64
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    5000
}

fn default_multiplier() -> f64 {
    2.0
}
