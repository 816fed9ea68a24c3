//! Event handler registry — which handlers listen to which events, per epoch.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

/// Identifier returned when a handler is registered.
pub type SubscriptionId = Uuid;

/// Callback invoked with an event's payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    id: SubscriptionId,
    epoch: u64,
    handler: EventHandler,
}

/// Event name → handlers, each tagged with the epoch it was registered on.
pub(crate) struct HandlerRegistry {
    by_event: DashMap<String, Vec<Entry>>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            by_event: DashMap::new(),
        }
    }

    /// Records a handler for `event` on `epoch`.
    pub(crate) fn add(&self, event: &str, epoch: u64, handler: EventHandler) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.by_event
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, epoch, handler });
        id
    }

    /// Removes one handler. Returns `false` if it was not registered.
    pub(crate) fn remove(&self, event: &str, id: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut entries) = self.by_event.get_mut(event) {
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            removed = entries.len() < before;
        }
        self.by_event.remove_if(event, |_, entries| entries.is_empty());
        removed
    }

    /// Handlers for `event` registered on `epoch`.
    pub(crate) fn handlers_for(&self, event: &str, epoch: u64) -> Vec<EventHandler> {
        self.by_event
            .get(event)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.epoch == epoch)
                    .map(|entry| entry.handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drops every handler not registered on `epoch`.
    pub(crate) fn retain_epoch(&self, epoch: u64) {
        self.by_event.retain(|_, entries| {
            entries.retain(|entry| entry.epoch == epoch);
            !entries.is_empty()
        });
    }

    /// Drops every handler.
    pub(crate) fn clear(&self) {
        self.by_event.clear();
    }

    /// Total registered handlers.
    pub(crate) fn count(&self) -> usize {
        self.by_event.iter().map(|entries| entries.len()).sum()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("events", &self.by_event.len())
            .field("handlers", &self.count())
            .finish()
    }
}
