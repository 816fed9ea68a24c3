//! Identity context — owns the shared [`AuthState`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use campus_entity::SessionToken;

use super::resolver::SessionResolver;
use super::state::{AuthState, Session};
use super::store::TokenStore;

/// Single source of truth for the viewer's authentication state.
///
/// Readers hold a [`watch::Receiver`] and always observe the latest value.
/// Every login and logout starts a new session epoch; a resolution that
/// finishes after a newer epoch began is discarded.
#[derive(Debug)]
pub struct IdentityContext {
    resolver: Arc<dyn SessionResolver>,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<AuthState>,
    epoch: AtomicU64,
}

impl IdentityContext {
    /// Creates a context in the `Unresolved` state.
    pub fn new(resolver: Arc<dyn SessionResolver>, store: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthState::Unresolved);
        Self {
            resolver,
            store,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Resolves the stored token into a session.
    ///
    /// Moves `Unresolved` to `Authenticated` or `Unauthenticated`, or refreshes
    /// an existing session. Never moves back to `Unresolved`.
    pub async fn resolve(&self) -> AuthState {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let token = match self.store.load().await {
            Ok(Some(token)) if token.is_usable() => token,
            Ok(_) => {
                debug!("No stored session token");
                self.settle(epoch, AuthState::Unauthenticated);
                return self.state();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read session token");
                self.settle(epoch, AuthState::Unauthenticated);
                return self.state();
            }
        };

        match self.resolver.resolve(&token).await {
            Ok(Some(resolved)) => {
                let token = resolved.token.unwrap_or(token);
                let principal = resolved.principal;
                if principal.roles.is_empty() {
                    warn!(principal_id = %principal.id, "Resolved principal holds no known roles");
                }

                let principal_id = principal.id.clone();
                let session = Session::new(principal, token.clone());
                if self.settle(epoch, AuthState::Authenticated(session)) {
                    if let Err(e) = self.store.save(&token).await {
                        warn!(error = %e, "Failed to persist session token");
                    }
                    info!(principal_id = %principal_id, "Session resolved");
                }
            }
            Ok(None) => {
                if self.settle(epoch, AuthState::Unauthenticated) {
                    if let Err(e) = self.store.clear().await {
                        warn!(error = %e, "Failed to clear rejected session token");
                    }
                    info!("Stored session token was rejected");
                }
            }
            Err(e) => {
                // Token kept so a later resolve can retry.
                warn!(error = %e, "Session resolution failed");
                self.settle_failure(epoch, &token);
            }
        }

        self.state()
    }

    /// Starts a new session from a freshly issued token.
    pub async fn login(&self, token: SessionToken) -> AuthState {
        self.begin_epoch();
        if let Err(e) = self.store.save(&token).await {
            warn!(error = %e, "Failed to persist session token");
        }
        self.resolve().await
    }

    /// Ends the current session.
    ///
    /// The state flips to `Unauthenticated` before any I/O so dependents
    /// tear down immediately; the backend is notified best-effort afterwards.
    pub async fn logout(&self) {
        let mut previous = None;
        self.state.send_modify(|state| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            previous = state.session().map(|s| s.token.clone());
            *state = AuthState::Unauthenticated;
        });

        let stored = self.store.load().await.ok().flatten();
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "Failed to clear session token");
        }

        if let Some(token) = previous.or(stored) {
            if let Err(e) = self.resolver.logout(&token).await {
                warn!(error = %e, "Logout notification failed");
            }
        }

        info!("Session ended");
    }

    fn begin_epoch(&self) {
        self.state.send_if_modified(|_| {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            false
        });
    }

    /// Records a failed resolution of `token`.
    ///
    /// A session already authenticated with the same token is kept, so a
    /// backend outage does not sign the viewer out. Anything else settles
    /// as `Unauthenticated`.
    fn settle_failure(&self, epoch: u64, token: &SessionToken) {
        let mut current = false;
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            current = true;
            match state {
                AuthState::Authenticated(session) if session.token == *token => {
                    debug!("Keeping current session after failed refresh");
                    false
                }
                AuthState::Unauthenticated => false,
                _ => {
                    *state = AuthState::Unauthenticated;
                    true
                }
            }
        });

        if !current {
            debug!("Discarded stale session resolution");
        }
    }

    /// Applies `next` if no newer epoch started since `epoch` was read.
    ///
    /// Returns whether the result was current.
    fn settle(&self, epoch: u64, next: AuthState) -> bool {
        let mut current = false;
        self.state.send_if_modified(|state| {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                return false;
            }
            current = true;
            if *state == next {
                return false;
            }
            debug!(from = state.label(), to = next.label(), "Auth state transition");
            *state = next;
            true
        });

        if !current {
            debug!("Discarded stale session resolution");
        }
        current
    }
}
