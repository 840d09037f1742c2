//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{body::Bytes, http::Method, http::Uri, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use request_guard::{GuardConfig, HttpServer, Shutdown};

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Start an upstream that echoes the method, path and body it received.
pub async fn start_echo_upstream() -> SocketAddr {
    async fn echo(method: Method, uri: Uri, body: Bytes) -> Json<Value> {
        Json(json!({
            "method": method.as_str(),
            "path": uri.path(),
            "body": String::from_utf8_lossy(&body),
        }))
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(echo))
            .await
            .unwrap();
    });
    addr
}

/// A running guard in front of an echo upstream.
pub struct TestGuard {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_updates: mpsc::UnboundedSender<GuardConfig>,
}

impl TestGuard {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Config with an inline webhook secret and no metrics/admin listeners.
pub fn test_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.webhook.secret = Some(WEBHOOK_SECRET.to_string());
    config.observability.metrics_enabled = false;
    config
}

/// Start the guard with `config`, pointing it at a fresh echo upstream.
pub async fn start_guard(mut config: GuardConfig) -> TestGuard {
    let upstream = start_echo_upstream().await;
    config.upstream.address = upstream.to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, rx, server_shutdown).await.unwrap();
    });

    TestGuard {
        addr,
        shutdown,
        config_updates: tx,
    }
}

/// Poll `check` until it holds or the timeout elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
