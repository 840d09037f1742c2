//! request-guard: rate limiting, CSRF and webhook signature checks in front
//! of an HTTP application.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use request_guard::config::{load_config, ConfigWatcher, GuardConfig};
use request_guard::lifecycle::{wait_for_shutdown_signal, Shutdown};
use request_guard::observability::{logging, metrics};
use request_guard::HttpServer;

#[derive(Parser)]
#[command(name = "request-guard", version, about = "Admission control for an HTTP application")]
struct Args {
    /// Path to the TOML config file. Defaults are used when omitted.
    #[arg(short, long, env = "GUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GuardConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "request-guard starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    if config.webhook.resolve_secret().is_none() && !config.webhook.paths.is_empty() {
        tracing::warn!(
            env = %config.webhook.secret_env,
            "No webhook secret configured; webhook paths will answer 500"
        );
    }

    // Keep the watcher alive for the life of the process.
    let (watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        None => (None, tokio::sync::mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            wait_for_shutdown_signal().await;
            shutdown.trigger();
        }
    });

    HttpServer::new(config)?
        .run(listener, config_updates, server_shutdown)
        .await?;

    drop(watcher);
    tracing::info!("Shutdown complete");
    Ok(())
}
