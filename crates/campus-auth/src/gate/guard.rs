//! View guards — bind a gate decision to a mounted view's lifetime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use campus_entity::RoleSet;

use crate::identity::AuthState;

use super::decision::AccessDecision;
use super::enforcer::AccessGate;

/// Performs route changes on behalf of guarded views.
pub trait Navigator: Send + Sync + 'static {
    /// Navigate to `path`.
    fn navigate(&self, path: &str);
}

/// A navigation scheduled for later that can be called off.
///
/// Dropping it cancels the navigation if it has not happened yet.
#[derive(Debug)]
pub struct DeferredRedirect {
    path: String,
    cancel: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl DeferredRedirect {
    /// Schedules a navigation to `path` after `delay`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(navigator: Arc<dyn Navigator>, path: String, delay: Duration) -> Self {
        Self::schedule_with(navigator, path, delay, CancellationToken::new())
    }

    fn schedule_with(
        navigator: Arc<dyn Navigator>,
        path: String,
        delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let fired = Arc::new(AtomicBool::new(false));

        let task_cancel = cancel.clone();
        let task_fired = fired.clone();
        let task_path = path.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    debug!(path = %task_path, "Deferred redirect cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if !task_cancel.is_cancelled() {
                        task_fired.store(true, Ordering::SeqCst);
                        info!(path = %task_path, "Redirecting");
                        navigator.navigate(&task_path);
                    }
                }
            }
        });

        Self {
            path,
            cancel,
            fired,
        }
    }

    /// Target route.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Calls the navigation off.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the navigation already happened.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for DeferredRedirect {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Guards one mounted protected view.
///
/// Re-evaluates the gate on every identity change and performs the redirect
/// for `Redirect` decisions after the configured delay. Unmounting (dropping)
/// the guard cancels any redirect still pending.
#[derive(Debug)]
pub struct ViewGuard {
    gate: Arc<AccessGate>,
    required: RoleSet,
    identity: watch::Receiver<AuthState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ViewGuard {
    /// Mounts a guard for a view requiring any of `required`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(
        gate: Arc<AccessGate>,
        required: RoleSet,
        identity: watch::Receiver<AuthState>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(watch_identity(
            gate.clone(),
            required.clone(),
            identity.clone(),
            navigator,
            cancel.clone(),
        ));

        Self {
            gate,
            required,
            identity,
            cancel,
            task: Some(task),
        }
    }

    /// Decision for the latest identity state.
    pub fn decision(&self) -> AccessDecision {
        self.gate.evaluate(&self.required, &self.identity.borrow())
    }

    /// Unmounts the view and waits for the guard task to stop.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_identity(
    gate: Arc<AccessGate>,
    required: RoleSet,
    mut identity: watch::Receiver<AuthState>,
    navigator: Arc<dyn Navigator>,
    cancel: CancellationToken,
) {
    let delay = Duration::from_millis(gate.config().redirect_delay_ms);
    let mut pending: Option<DeferredRedirect> = None;

    loop {
        let decision = gate.evaluate(&required, &identity.borrow_and_update());

        match decision {
            AccessDecision::Redirect(target) => {
                let path = gate.redirect_path(target);
                if pending.as_ref().map(DeferredRedirect::path) != Some(path) {
                    debug!(path = %path, delay_ms = delay.as_millis() as u64, "Scheduling redirect");
                    pending = Some(DeferredRedirect::schedule_with(
                        navigator.clone(),
                        path.to_string(),
                        delay,
                        cancel.child_token(),
                    ));
                }
            }
            AccessDecision::Allow | AccessDecision::Pending => {
                pending = None;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = identity.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    drop(pending);
    debug!("View guard stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use campus_core::config::GateConfig;
    use campus_entity::{Principal, Role, SessionToken};

    use super::*;
    use crate::identity::Session;

    #[derive(Debug, Default)]
    struct RecordingNavigator {
        visits: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        fn visits(&self) -> Vec<String> {
            self.visits.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, path: &str) {
            self.visits.lock().unwrap().push(path.to_string());
        }
    }

    fn gate(delay_ms: u64) -> Arc<AccessGate> {
        Arc::new(AccessGate::new(GateConfig {
            redirect_delay_ms: delay_ms,
            ..GateConfig::default()
        }))
    }

    fn signed_in(role: Role) -> AuthState {
        AuthState::Authenticated(Session::new(
            Principal::new("u1", RoleSet::from([role])),
            SessionToken::new("t1"),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_redirect_fires_after_delay() {
        let navigator = Arc::new(RecordingNavigator::default());
        let redirect =
            DeferredRedirect::schedule(navigator.clone(), "/login".into(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(navigator.visits().is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(navigator.visits(), vec!["/login".to_string()]);
        assert!(redirect.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_redirect_never_fires() {
        let navigator = Arc::new(RecordingNavigator::default());
        let redirect =
            DeferredRedirect::schedule(navigator.clone(), "/login".into(), Duration::from_secs(2));
        drop(redirect);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_waits_while_unresolved_then_redirects() {
        let navigator = Arc::new(RecordingNavigator::default());
        let (tx, rx) = watch::channel(AuthState::Unresolved);
        let guard = ViewGuard::mount(
            gate(0),
            RoleSet::from([Role::Faculty]),
            rx,
            navigator.clone(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(guard.decision(), AccessDecision::Pending);
        assert!(navigator.visits().is_empty());

        tx.send_replace(signed_in(Role::Student));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(navigator.visits(), vec!["/unauthorized".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_cancels_pending_redirect() {
        let navigator = Arc::new(RecordingNavigator::default());
        let (_tx, rx) = watch::channel(AuthState::Unauthenticated);
        let guard = ViewGuard::mount(
            gate(2_000),
            RoleSet::from([Role::Student]),
            rx,
            navigator.clone(),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(guard);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(navigator.visits().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_before_delay_cancels_redirect() {
        let navigator = Arc::new(RecordingNavigator::default());
        let (tx, rx) = watch::channel(signed_in(Role::Student));
        let guard = ViewGuard::mount(
            gate(1_000),
            RoleSet::from([Role::Faculty]),
            rx,
            navigator.clone(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send_replace(signed_in(Role::Faculty));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(navigator.visits().is_empty());
        assert_eq!(guard.decision(), AccessDecision::Allow);
        guard.unmount().await;
    }
}
