//! Channel manager — owns the single live connection and its handlers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use campus_core::config::RealtimeConfig;
use campus_core::{AppError, AppResult};

use crate::message::Envelope;
use crate::transport::Transport;

use super::driver::Driver;
use super::handlers::{EventHandler, HandlerRegistry, SubscriptionId};
use super::key::ScopeKey;
use super::state::{ChannelEvent, ChannelState, ChannelStatus, DisconnectReason};

/// State shared between the manager and its connection driver.
///
/// Every status change goes through the watch sender, and the generation
/// check happens under its lock, so a stale driver can never overwrite a
/// newer connect or disconnect.
#[derive(Debug)]
pub(crate) struct Shared {
    status: watch::Sender<ChannelStatus>,
    events: broadcast::Sender<ChannelEvent>,
    handlers: HandlerRegistry,
}

impl Shared {
    fn new(event_buffer: usize) -> Self {
        let (status, _) = watch::channel(ChannelStatus::initial());
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            status,
            events,
            handlers: HandlerRegistry::new(),
        }
    }

    /// Starts a new generation in `Connecting` on a fresh epoch.
    fn begin(&self) -> (u64, u64) {
        let mut ids = (0, 0);
        self.status.send_modify(|status| {
            status.generation += 1;
            status.epoch += 1;
            status.state = ChannelState::Connecting;
            self.handlers.clear();
            ids = (status.generation, status.epoch);
            let _ = self.events.send(ChannelEvent::Connecting {
                epoch: status.epoch,
            });
        });
        ids
    }

    /// Ends the current generation.
    fn end(&self, reason: DisconnectReason) {
        self.status.send_if_modified(|status| {
            status.generation += 1;
            self.handlers.clear();
            if status.state == ChannelState::Disconnected {
                return false;
            }
            status.state = ChannelState::Disconnected;
            let _ = self.events.send(ChannelEvent::Disconnected { reason });
            true
        });
    }

    /// Applies `change` if `generation` is still current.
    ///
    /// Handlers from other epochs are dropped afterwards and the returned
    /// events are broadcast while the status lock is held.
    pub(crate) fn transition<F>(&self, generation: u64, change: F) -> bool
    where
        F: FnOnce(&mut ChannelStatus) -> Vec<ChannelEvent>,
    {
        let mut applied = false;
        self.status.send_if_modified(|status| {
            if status.generation != generation {
                return false;
            }
            applied = true;
            let events = change(status);
            if status.state == ChannelState::Disconnected {
                self.handlers.clear();
            } else {
                self.handlers.retain_epoch(status.epoch);
            }
            for event in events {
                let _ = self.events.send(event);
            }
            true
        });
        applied
    }

    /// Broadcasts `event` if `generation` is still current.
    pub(crate) fn notify(&self, generation: u64, event: ChannelEvent) {
        let status = self.status.borrow();
        if status.generation == generation {
            let _ = self.events.send(event);
        }
    }

    /// Runs the handlers registered for an inbound frame.
    pub(crate) fn dispatch(&self, generation: u64, envelope: Envelope) {
        let epoch = {
            let status = self.status.borrow();
            if status.generation != generation || status.state != ChannelState::Connected {
                return;
            }
            status.epoch
        };

        let handlers = self.handlers.handlers_for(&envelope.event, epoch);
        if handlers.is_empty() {
            debug!(event = %envelope.event, "No handler for realtime event");
            return;
        }
        for handler in handlers {
            handler(&envelope.data);
        }
    }

    fn register(&self, event: &str, epoch: Option<u64>, handler: EventHandler) -> Option<SubscriptionId> {
        // Held across the insert so the epoch cannot move underneath it.
        let status = self.status.borrow();
        if !status.state.is_active() || epoch.is_some_and(|e| e != status.epoch) {
            return None;
        }
        let id = self.handlers.add(event, status.epoch, handler);
        debug!(event = %event, epoch = status.epoch, subscription_id = %id, "Handler registered");
        Some(id)
    }
}

/// The connection currently owned by the manager.
#[derive(Debug)]
struct ActiveConnection {
    key: ScopeKey,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    outbound: mpsc::Sender<Envelope>,
}

/// Owns at most one live realtime connection.
///
/// Constructed once at application start and shared by `Arc`. All
/// operations are non-blocking and never fail; problems show up as state
/// transitions and [`ChannelEvent`]s.
#[derive(Debug)]
pub struct ChannelManager {
    /// Status, events and handlers shared with the driver.
    shared: Arc<Shared>,
    /// Transport used to open links.
    transport: Arc<dyn Transport>,
    /// Configuration.
    config: RealtimeConfig,
    /// Runtime driver tasks are spawned on.
    runtime: Handle,
    /// Current connection, if any.
    active: Mutex<Option<ActiveConnection>>,
    /// Driver of a disconnected connection that may still be closing its link.
    releasing: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelManager {
    /// Creates a manager in the `Disconnected` state.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: RealtimeConfig, transport: Arc<dyn Transport>) -> AppResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            AppError::configuration(format!("Channel manager needs a Tokio runtime: {e}"))
        })?;

        Ok(Self {
            shared: Arc::new(Shared::new(config.event_buffer_size)),
            transport,
            config,
            runtime,
            active: Mutex::new(None),
            releasing: Mutex::new(None),
        })
    }

    /// Opens a connection for `key`.
    ///
    /// A no-op if a connection with the same key is already connecting,
    /// connected or reconnecting. A connection with a different key is torn
    /// down first. The new link is only opened once the previous one, whether
    /// superseded here or closed by an earlier `disconnect`, is released.
    pub fn connect(&self, key: ScopeKey) {
        let mut active = self.lock_active();

        let previous = match active.take() {
            Some(current) if current.key == key && self.state().is_active() => {
                debug!("Connect with unchanged scope ignored");
                *active = Some(current);
                return;
            }
            Some(current) => {
                current.cancel.cancel();
                if self.state().is_active() {
                    self.shared.end(DisconnectReason::Superseded);
                    info!("Realtime connection superseded by a new scope");
                }
                Some(current.task)
            }
            None => self.lock_releasing().take(),
        };

        let (generation, epoch) = self.shared.begin();
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_buffer_size.max(1));

        let driver = Driver {
            shared: self.shared.clone(),
            transport: self.transport.clone(),
            policy: self.config.reconnect.clone(),
            handshake_timeout: Duration::from_secs(self.config.handshake_timeout_seconds),
            key: key.clone(),
            generation,
            cancel: cancel.clone(),
            outbound: outbound_rx,
        };
        let task = self.runtime.spawn(driver.run(previous));

        info!(
            epoch,
            college_id = ?key.college_id,
            department = ?key.department,
            roles = %key.roles,
            "Realtime connection starting"
        );

        *active = Some(ActiveConnection {
            key,
            cancel,
            task,
            outbound: outbound_tx,
        });
    }

    /// Closes the connection, cancelling any handshake in flight.
    ///
    /// Always safe to call; releases every handler. The transport is
    /// released asynchronously; use [`shutdown`](Self::shutdown) to wait.
    pub fn disconnect(&self) {
        let mut active = self.lock_active();
        if let Some(current) = active.take() {
            current.cancel.cancel();
            *self.lock_releasing() = Some(current.task);
        }
        drop(active);

        let was_active = self.state().is_active();
        self.shared.end(DisconnectReason::ClientRequested);
        if was_active {
            info!("Realtime connection closed");
        }
    }

    /// Disconnects and waits until the transport is released.
    pub async fn shutdown(&self) {
        let taken = self.lock_active().take();
        let releasing = self.lock_releasing().take();
        self.shared.end(DisconnectReason::ClientRequested);
        if let Some(current) = taken {
            current.cancel.cancel();
            let _ = current.task.await;
        }
        if let Some(task) = releasing {
            let _ = task.await;
        }
    }

    /// Registers a handler on the current transport instance.
    ///
    /// Returns `None` when there is no connection. The handler is dropped
    /// when that instance ends (disconnect, new scope or reconnect).
    pub fn on<F>(&self, event: &str, handler: F) -> Option<SubscriptionId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.shared.register(event, None, Arc::new(handler))
    }

    /// Registers a shared handler only if `epoch` is still current.
    pub fn on_epoch(&self, event: &str, epoch: u64, handler: EventHandler) -> Option<SubscriptionId> {
        self.shared.register(event, Some(epoch), handler)
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        self.shared.handlers.remove(event, id)
    }

    /// Queues an outbound event on the connection.
    ///
    /// Returns `false` if there is no connection or the queue is full.
    /// Frames queued while reconnecting go out once the link is back.
    pub fn emit(&self, event: impl Into<String>, data: Value) -> bool {
        let active = self.lock_active();
        match active.as_ref() {
            Some(current) if self.state().is_active() => current
                .outbound
                .try_send(Envelope::new(event, data))
                .is_ok(),
            _ => false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.shared.status.borrow().state
    }

    /// Current status snapshot.
    pub fn status(&self) -> ChannelStatus {
        *self.shared.status.borrow()
    }

    /// Whether the connection is live.
    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Scope of the current connection, if any.
    pub fn current_key(&self) -> Option<ScopeKey> {
        if !self.state().is_active() {
            return None;
        }
        self.lock_active().as_ref().map(|current| current.key.clone())
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.shared.handlers.count()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Always taken after `active` when both are held.
    fn lock_releasing(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.releasing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        let active = self
            .active
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(current) = active {
            current.cancel.cancel();
        }
    }
}
