//! Campus Portal — session-gated access and realtime channel runtime
//!
//! Main entry point that wires the identity context, access gate and
//! realtime channel together and runs until shutdown.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use campus_auth::{
    AccessGate, HttpSessionResolver, IdentityContext, MemoryTokenStore, Navigator, ViewGuard,
};
use campus_core::config::AppConfig;
use campus_core::error::AppError;
use campus_entity::{RoleSet, SessionToken};
use campus_realtime::transport::WsTransport;
use campus_realtime::{ChannelEvent, ChannelManager, PresenceTracker, RealtimeContext};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Portal error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("CAMPUS_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Navigator for a headless portal: records where a view would be sent.
struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        tracing::warn!(path = %path, "Guarded view redirected");
    }
}

/// Main portal run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Campus Portal v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Identity context ─────────────────────────────────
    let store = match std::env::var("CAMPUS_TOKEN") {
        Ok(token) => MemoryTokenStore::with_token(SessionToken::new(token)),
        Err(_) => MemoryTokenStore::new(),
    };
    let resolver = HttpSessionResolver::new(&config.identity)?;
    let identity = Arc::new(IdentityContext::new(Arc::new(resolver), Arc::new(store)));
    tracing::info!(session_url = %config.identity.session_url(), "Identity context ready");

    // ── Step 2: Access gate ──────────────────────────────────────
    let gate = Arc::new(AccessGate::new(config.gate.clone()));
    let route = std::env::var("CAMPUS_ROUTE").unwrap_or_else(|_| "/student".to_string());
    let required = gate
        .policies()
        .required_roles(&route)
        .cloned()
        .unwrap_or_else(RoleSet::new);

    // ── Step 3: Realtime channel ─────────────────────────────────
    let transport = Arc::new(WsTransport::from_config(&config.realtime));
    let manager = Arc::new(ChannelManager::new(config.realtime.clone(), transport)?);
    let mut events = manager.subscribe_events();
    let event_log = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ChannelEvent::Error { failure, message } => {
                    tracing::warn!(?failure, message = %message, "Realtime channel error");
                }
                other => tracing::debug!(event = ?other, "Realtime channel event"),
            }
        }
    });

    let realtime = RealtimeContext::attach(manager.clone(), identity.subscribe());
    let presence = Arc::new(PresenceTracker::new());
    presence.attach(&realtime);

    // ── Step 4: Resolve the session and guard the view ──────────
    let guard = if required.is_empty() {
        tracing::info!(route = %route, "Route is not protected");
        None
    } else {
        Some(ViewGuard::mount(
            gate.clone(),
            required,
            identity.subscribe(),
            Arc::new(LogNavigator),
        ))
    };

    let state = identity.resolve().await;
    tracing::info!(
        state = state.label(),
        route = %route,
        decision = ?gate.evaluate_route(&route, &state),
        "Session resolved"
    );

    // ── Step 5: Run until shutdown ───────────────────────────────
    shutdown_signal().await;
    tracing::info!(
        online = presence.online_count(),
        "Shutdown signal received, closing realtime channel..."
    );

    if let Some(guard) = guard {
        guard.unmount().await;
    }
    realtime.shutdown().await;
    event_log.abort();

    tracing::info!("Campus Portal stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
