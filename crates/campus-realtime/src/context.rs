//! Realtime context — ties the channel manager to the identity context.
//!
//! The context owns the connection lifecycle for the whole application:
//! it connects when a session is authenticated, disconnects when it is not,
//! and keeps a table of persistent listeners that it re-registers on every
//! new transport instance.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use campus_auth::AuthState;

use crate::connection::handlers::{EventHandler, SubscriptionId};
use crate::connection::key::ScopeKey;
use crate::connection::manager::ChannelManager;
use crate::connection::state::{ChannelState, ChannelStatus};

/// Identifier of a persistent listener.
pub type ListenerId = Uuid;

struct Listener {
    id: ListenerId,
    event: String,
    handler: EventHandler,
    subscription: Option<SubscriptionId>,
}

/// Persistent listeners and the epoch they are currently bound to.
#[derive(Default)]
struct ListenerTable {
    epoch: Option<u64>,
    entries: Vec<Listener>,
}

impl ListenerTable {
    /// Binds every listener to `status`'s epoch if it is not already.
    fn rebind(&mut self, manager: &ChannelManager, status: ChannelStatus) {
        if status.state == ChannelState::Disconnected {
            self.unbind();
            return;
        }
        if self.epoch == Some(status.epoch) {
            return;
        }

        self.epoch = Some(status.epoch);
        for listener in &mut self.entries {
            listener.subscription =
                manager.on_epoch(&listener.event, status.epoch, listener.handler.clone());
            if listener.subscription.is_none() {
                // The epoch moved on; the next status change binds again.
                self.epoch = None;
            }
        }

        if self.epoch.is_some() {
            debug!(
                epoch = status.epoch,
                listeners = self.entries.len(),
                "Realtime listeners bound"
            );
        }
    }

    fn unbind(&mut self) {
        self.epoch = None;
        for listener in &mut self.entries {
            listener.subscription = None;
        }
    }
}

/// Application-wide realtime adapter.
///
/// Attach it once, after the identity context and the channel manager are
/// built. Dropping it (or calling [`shutdown`](Self::shutdown)) disconnects.
pub struct RealtimeContext {
    manager: Arc<ChannelManager>,
    listeners: Arc<Mutex<ListenerTable>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealtimeContext {
    /// Starts following `identity`.
    ///
    /// The current identity state is applied before this returns. Must be
    /// called from within a Tokio runtime.
    pub fn attach(manager: Arc<ChannelManager>, mut identity: watch::Receiver<AuthState>) -> Self {
        let listeners = Arc::new(Mutex::new(ListenerTable::default()));
        let cancel = CancellationToken::new();

        let initial = identity.borrow_and_update().clone();
        follow_identity(&manager, &initial);

        let task = tokio::spawn(drive(
            manager.clone(),
            identity,
            listeners.clone(),
            cancel.clone(),
        ));

        Self {
            manager,
            listeners,
            cancel,
            task: Some(task),
        }
    }

    /// Whether the channel is live.
    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Current channel state.
    pub fn state(&self) -> ChannelState {
        self.manager.state()
    }

    /// The underlying manager.
    pub fn manager(&self) -> &Arc<ChannelManager> {
        &self.manager
    }

    /// Registers a listener that survives reconnects and new sessions.
    ///
    /// It is bound immediately if a connection exists, and re-bound on
    /// every new transport instance until [`unlisten`](Self::unlisten).
    pub fn listen<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let id = Uuid::new_v4();

        let mut table = lock(&self.listeners);
        let subscription = table
            .epoch
            .and_then(|epoch| self.manager.on_epoch(event, epoch, handler.clone()));
        table.entries.push(Listener {
            id,
            event: event.to_string(),
            handler,
            subscription,
        });

        debug!(event = %event, listener_id = %id, "Realtime listener added");
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut table = lock(&self.listeners);
        let Some(index) = table.entries.iter().position(|l| l.id == id) else {
            return false;
        };
        let listener = table.entries.remove(index);
        if let Some(subscription) = listener.subscription {
            self.manager.off(&listener.event, subscription);
        }
        true
    }

    /// Number of persistent listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }

    /// Queues an outbound event. Returns whether it was queued.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> bool {
        self.manager.emit(event, data)
    }

    /// Stops following identity and waits until the transport is released.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.manager.shutdown().await;
        info!("Realtime context shut down");
    }
}

impl std::fmt::Debug for RealtimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeContext")
            .field("state", &self.manager.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Drop for RealtimeContext {
    fn drop(&mut self) {
        self.cancel.cancel();
        if self.task.is_some() {
            self.manager.disconnect();
        }
    }
}

fn lock(listeners: &Mutex<ListenerTable>) -> MutexGuard<'_, ListenerTable> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

fn follow_identity(manager: &ChannelManager, state: &AuthState) {
    match state {
        AuthState::Authenticated(session) => match ScopeKey::from_session(session) {
            Some(key) => manager.connect(key),
            None => {
                warn!(
                    user_id = %session.principal.id,
                    "Session token is unusable, realtime stays disconnected"
                );
                manager.disconnect();
            }
        },
        AuthState::Unauthenticated => manager.disconnect(),
        AuthState::Unresolved => {}
    }
}

async fn drive(
    manager: Arc<ChannelManager>,
    mut identity: watch::Receiver<AuthState>,
    listeners: Arc<Mutex<ListenerTable>>,
    cancel: CancellationToken,
) {
    let mut status = manager.subscribe_status();
    let current = *status.borrow_and_update();
    lock(&listeners).rebind(&manager, current);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            changed = identity.changed() => {
                if changed.is_err() {
                    debug!("Identity context dropped, closing realtime connection");
                    manager.disconnect();
                    return;
                }
                let state = identity.borrow_and_update().clone();
                debug!(state = state.label(), "Identity changed");
                follow_identity(&manager, &state);
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return;
                }
                let current = *status.borrow_and_update();
                lock(&listeners).rebind(&manager, current);
            }
        }
    }
}
