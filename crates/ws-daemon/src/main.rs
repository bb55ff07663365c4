// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `wsd`: the workspace orchestrator daemon binary. Wires `ConfigStore`
//! / `HistoryStore` / `PartialStore` / `SubscriptionHub` /
//! `SessionRegistry` / `WorkspaceLifecycle` together and serves the
//! HTTP+WS transport (spec.md §6).

mod env;
mod lifecycle;
mod model;
mod session_registry;
mod transport;

use std::sync::Arc;

use tracing::{info, warn};

use lifecycle::WorkspaceLifecycle;
use model::UnconfiguredModelStreamFactory;
use session_registry::SessionRegistry;
use transport::AppState;
use ws_core::{Clock, SystemClock};
use ws_session::{ModelStreamFactory, SubscriptionHub};
use ws_storage::{ConfigStore, HistoryStore, PartialStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_home = env::config_home();
    let session_dir = env::session_dir();
    std::fs::create_dir_all(&config_home)?;
    std::fs::create_dir_all(&session_dir)?;

    let config = Arc::new(ConfigStore::new(config_home.clone()));
    let history = Arc::new(HistoryStore::new(session_dir.clone()));
    let partial = Arc::new(PartialStore::new(session_dir.clone()));
    let hub = Arc::new(SubscriptionHub::new());
    let model_factory: Arc<dyn ModelStreamFactory> = Arc::new(UnconfiguredModelStreamFactory);
    let sessions =
        Arc::new(SessionRegistry::new(Arc::clone(&history), Arc::clone(&partial), Arc::clone(&hub), model_factory));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let lifecycle = Arc::new(WorkspaceLifecycle::new(Arc::clone(&config), Arc::clone(&sessions), clock));

    let auth_token = env::auth_token();
    if auth_token.is_none() {
        warn!("WS_AUTH_TOKEN is not set; the daemon is accepting unauthenticated connections");
    }

    let state = Arc::new(AppState { config, history, partial, sessions, hub, lifecycle, auth_token });
    let app = transport::router(state);

    let addr = env::listen_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "ws daemon listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutting down");
}
