//! Admin API.
//!
//! Read-only views of the guard's in-memory state, served on a separate
//! listener behind a bearer key taken from the environment.

pub mod auth;
pub mod handlers;

use std::io;
use std::sync::Arc;
use std::time::Instant;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::{get_limits, get_status, get_tokens};
use crate::config::AdminConfig;
use crate::http::pipeline::GuardState;
use crate::lifecycle::shutdown::recv_shutdown;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub guard: GuardState,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/limits", get(get_limits))
        .route("/admin/tokens", get(get_tokens))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until shutdown. Refuses to start without a key.
pub async fn serve(
    config: &AdminConfig,
    guard: GuardState,
    shutdown: broadcast::Receiver<()>,
) -> io::Result<()> {
    let api_key = match std::env::var(&config.api_key_env) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            tracing::error!(
                env = %config.api_key_env,
                "Admin API enabled but no key is set; not starting it"
            );
            return Ok(());
        }
    };

    let state = AdminState {
        guard,
        api_key: Arc::from(api_key.trim()),
        started_at: Instant::now(),
    };

    let listener = TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(recv_shutdown(shutdown))
        .await
}
