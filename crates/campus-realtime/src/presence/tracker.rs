//! Presence tracker — keeps the set of online users in the viewer's scope.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use campus_entity::{PrincipalId, RoleSet};

use crate::connection::state::{ChannelState, ChannelStatus};
use crate::context::{ListenerId, RealtimeContext};

/// A user came online.
pub const ONLINE_EVENT: &str = "presence:online";
/// A user went offline.
pub const OFFLINE_EVENT: &str = "presence:offline";
/// Full list of online users, sent after connecting.
pub const SNAPSHOT_EVENT: &str = "presence:snapshot";

/// Online user info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    /// User ID
    pub user_id: PrincipalId,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Roles
    #[serde(default)]
    pub roles: RoleSet,
    /// When the user was first seen online
    #[serde(default = "Utc::now")]
    pub since: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfflineNotice {
    user_id: PrincipalId,
}

/// Tracks which users are online.
///
/// The list belongs to one transport instance: it is dropped when the
/// channel disconnects or moves to a new epoch, and rebuilt from the
/// server's next snapshot.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    /// User ID → presence info
    users: DashMap<PrincipalId, OnlineUser>,
    /// Epoch the current list was received on; held while the list changes
    epoch: Mutex<u64>,
}

impl PresenceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the presence events on `context`.
    ///
    /// The listeners are persistent, so tracking continues across
    /// reconnects and new sessions. A background task clears the list
    /// whenever the connection it came from ends. Must be called from
    /// within a Tokio runtime.
    pub fn attach(self: &Arc<Self>, context: &RealtimeContext) -> Vec<ListenerId> {
        let manager = context.manager();
        tokio::spawn(retire_on_status(
            Arc::downgrade(self),
            manager.subscribe_status(),
        ));

        [ONLINE_EVENT, OFFLINE_EVENT, SNAPSHOT_EVENT]
            .into_iter()
            .map(|event| {
                let tracker = Arc::clone(self);
                let manager = Arc::downgrade(manager);
                context.listen(event, move |data| {
                    if let Some(manager) = manager.upgrade() {
                        tracker.apply_on(manager.status().epoch, event, data);
                    }
                })
            })
            .collect()
    }

    /// Applies an event received on transport instance `epoch`.
    ///
    /// An event from a newer epoch replaces the list; one from an older
    /// epoch is ignored.
    pub fn apply_on(&self, epoch: u64, event: &str, data: &Value) -> bool {
        let mut current = self.lock_epoch();
        if epoch < *current {
            debug!(epoch, current = *current, "Ignoring presence event from an old connection");
            return false;
        }
        if epoch > *current {
            self.users.clear();
            *current = epoch;
        }
        self.apply(event, data)
    }

    /// Drops the list if `status` shows its connection is gone.
    pub fn retire(&self, status: ChannelStatus) {
        let current = self.lock_epoch();
        let stale = match status.state {
            ChannelState::Disconnected => *current <= status.epoch,
            _ => *current < status.epoch,
        };
        if stale && !self.users.is_empty() {
            debug!(
                epoch = *current,
                state = status.state.as_str(),
                "Presence list cleared"
            );
            self.users.clear();
        }
    }

    /// Applies one presence event. Returns whether anything changed.
    pub fn apply(&self, event: &str, data: &Value) -> bool {
        match event {
            ONLINE_EVENT => match OnlineUser::deserialize(data) {
                Ok(user) => {
                    debug!(user_id = %user.user_id, "User online");
                    self.users
                        .entry(user.user_id.clone())
                        .and_modify(|existing| {
                            existing.name = user.name.clone();
                            existing.roles = user.roles.clone();
                        })
                        .or_insert(user);
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Malformed presence:online payload");
                    false
                }
            },
            OFFLINE_EVENT => match OfflineNotice::deserialize(data) {
                Ok(notice) => {
                    debug!(user_id = %notice.user_id, "User offline");
                    self.users.remove(&notice.user_id).is_some()
                }
                Err(e) => {
                    warn!(error = %e, "Malformed presence:offline payload");
                    false
                }
            },
            SNAPSHOT_EVENT => match Vec::<OnlineUser>::deserialize(data) {
                Ok(users) => {
                    debug!(count = users.len(), "Presence snapshot");
                    self.users.clear();
                    for user in users {
                        self.users.insert(user.user_id.clone(), user);
                    }
                    true
                }
                Err(e) => {
                    warn!(error = %e, "Malformed presence:snapshot payload");
                    false
                }
            },
            _ => false,
        }
    }

    /// Check if a user is online
    pub fn is_online(&self, user_id: &PrincipalId) -> bool {
        self.users.contains_key(user_id)
    }

    /// Get online user count
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    /// All online users, oldest first.
    pub fn all_online(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self.users.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.since.cmp(&b.since).then_with(|| a.user_id.0.cmp(&b.user_id.0)));
        users
    }

    /// Forget everyone.
    pub fn clear(&self) {
        self.users.clear();
    }

    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn retire_on_status(
    tracker: std::sync::Weak<PresenceTracker>,
    mut status: tokio::sync::watch::Receiver<ChannelStatus>,
) {
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        match tracker.upgrade() {
            Some(tracker) => tracker.retire(current),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use campus_entity::Role;
    use serde_json::json;

    use super::*;

    fn id(raw: &str) -> PrincipalId {
        PrincipalId::new(raw)
    }

    #[test]
    fn test_online_then_offline() {
        let tracker = PresenceTracker::new();
        assert!(tracker.apply(
            ONLINE_EVENT,
            &json!({ "userId": "f1", "name": "Dr. Rao", "roles": ["faculty"] })
        ));
        assert!(tracker.is_online(&id("f1")));
        assert_eq!(tracker.all_online()[0].roles, RoleSet::from([Role::Faculty]));

        assert!(tracker.apply(OFFLINE_EVENT, &json!({ "userId": "f1" })));
        assert!(!tracker.is_online(&id("f1")));
        assert!(!tracker.apply(OFFLINE_EVENT, &json!({ "userId": "f1" })));
    }

    #[test]
    fn test_snapshot_replaces_everyone() {
        let tracker = PresenceTracker::new();
        tracker.apply(ONLINE_EVENT, &json!({ "userId": "old" }));

        tracker.apply(
            SNAPSHOT_EVENT,
            &json!([
                { "userId": "a", "roles": ["student"] },
                { "userId": "b", "roles": ["head_admin", "unknown"] }
            ]),
        );

        assert_eq!(tracker.online_count(), 2);
        assert!(!tracker.is_online(&id("old")));
        assert!(tracker.is_online(&id("b")));
    }

    #[test]
    fn test_repeat_online_keeps_since() {
        let tracker = PresenceTracker::new();
        tracker.apply(ONLINE_EVENT, &json!({ "userId": "a", "since": "2024-01-01T00:00:00Z" }));
        tracker.apply(ONLINE_EVENT, &json!({ "userId": "a", "name": "Asha" }));

        let user = &tracker.all_online()[0];
        assert_eq!(user.name.as_deref(), Some("Asha"));
        assert_eq!(user.since.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    fn status(state: ChannelState, epoch: u64) -> ChannelStatus {
        ChannelStatus {
            state,
            epoch,
            generation: 0,
        }
    }

    #[test]
    fn test_list_is_dropped_with_its_connection() {
        let tracker = PresenceTracker::new();
        tracker.apply_on(1, SNAPSHOT_EVENT, &json!([{ "userId": "a" }, { "userId": "b" }]));

        tracker.retire(status(ChannelState::Connected, 1));
        assert_eq!(tracker.online_count(), 2);

        tracker.retire(status(ChannelState::Reconnecting, 2));
        assert_eq!(tracker.online_count(), 0);

        tracker.apply_on(2, ONLINE_EVENT, &json!({ "userId": "c" }));
        tracker.retire(status(ChannelState::Disconnected, 2));
        assert_eq!(tracker.online_count(), 0);
    }

    #[test]
    fn test_newer_epoch_replaces_and_older_is_ignored() {
        let tracker = PresenceTracker::new();
        tracker.apply_on(1, ONLINE_EVENT, &json!({ "userId": "a" }));
        assert!(tracker.apply_on(2, ONLINE_EVENT, &json!({ "userId": "b" })));

        assert!(!tracker.is_online(&id("a")));
        assert!(!tracker.apply_on(1, ONLINE_EVENT, &json!({ "userId": "a" })));
        assert_eq!(tracker.online_count(), 1);
    }

    #[test]
    fn test_late_disconnect_does_not_clear_newer_list() {
        let tracker = PresenceTracker::new();
        tracker.apply_on(3, ONLINE_EVENT, &json!({ "userId": "a" }));

        tracker.retire(status(ChannelState::Disconnected, 2));
        assert!(tracker.is_online(&id("a")));
    }

    #[test]
    fn test_malformed_and_unrelated_events_are_ignored() {
        let tracker = PresenceTracker::new();
        assert!(!tracker.apply(ONLINE_EVENT, &json!({ "name": "no id" })));
        assert!(!tracker.apply(SNAPSHOT_EVENT, &json!({ "not": "a list" })));
        assert!(!tracker.apply("notice:new", &json!({ "userId": "a" })));
        assert_eq!(tracker.online_count(), 0);
    }
}
