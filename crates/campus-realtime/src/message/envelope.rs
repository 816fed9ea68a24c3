//! JSON frame envelope: `{ "event": ..., "data": ... }`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use campus_core::{AppError, AppResult};

use crate::connection::key::ScopeKey;

/// Name of the frame that authenticates a freshly opened socket.
pub const AUTHENTICATE_EVENT: &str = "authenticate";

/// A named event with a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Authentication frame carrying the connection's scope.
    pub fn authenticate(key: &ScopeKey) -> Self {
        Self::new(
            AUTHENTICATE_EVENT,
            json!({
                "token": key.token.expose(),
                "collegeId": key.college_id,
                "department": key.department,
                "roles": key.roles,
            }),
        )
    }

    /// Parse a text frame.
    pub fn decode(text: &str) -> AppResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| AppError::validation(format!("Malformed realtime frame: {e}")))
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
