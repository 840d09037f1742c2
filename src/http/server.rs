//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router: guard pipeline in front of the forwarding handler
//! - Wire up tower-http layers (request ID, tracing, timeout, body limit)
//! - Run the sweepers, the reload task and the admin API next to the server
//! - Forward admitted requests to the upstream service

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, Uri, Version,
    },
    response::{IntoResponse, Response},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::config::{validate_config, ConfigError, GuardConfig, ValidationError};
use crate::http::pipeline::{apply_guard, GuardState};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::GuardRejection;
use crate::lifecycle::shutdown::recv_shutdown;
use crate::observability::{logging, metrics};
use crate::security::Sweeper;

/// Where admitted requests go.
#[derive(Clone)]
pub struct UpstreamState {
    client: Client<HttpConnector, Body>,
    authority: Authority,
}

impl UpstreamState {
    pub fn new(address: &str) -> Result<Self, ValidationError> {
        let authority = address
            .trim()
            .parse::<Authority>()
            .map_err(|_| ValidationError::InvalidAddress {
                field: "upstream.address",
                value: address.to_string(),
            })?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self { client, authority })
    }
}

/// The guard as a standalone forwarding server.
pub struct HttpServer {
    router: Router,
    config: GuardConfig,
    state: GuardState,
}

impl HttpServer {
    /// Validate `config` and build fresh stores and the router.
    pub fn new(config: GuardConfig) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let state = GuardState::from_config(&config).map_err(|e| ConfigError::Validation(vec![e]))?;
        let upstream = UpstreamState::new(&config.upstream.address).map_err(|e| ConfigError::Validation(vec![e]))?;

        let router = build_router(&config, state.clone(), upstream);
        Ok(Self { router, config, state })
    }

    /// The complete router, for in-process use and tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires. Validated configs arriving on
    /// `config_updates` are applied without dropping counters or tokens.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GuardConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        Sweeper::new(
            self.state.rate_limiter.clone(),
            Duration::from_secs(self.config.rate_limit.sweep_interval_secs),
        )
        .spawn(shutdown.resubscribe());
        Sweeper::new(
            self.state.csrf.clone(),
            Duration::from_secs(self.config.csrf.sweep_interval_secs),
        )
        .spawn(shutdown.resubscribe());

        tokio::spawn(apply_config_updates(
            self.state.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        if self.config.admin.enabled {
            let admin_config = self.config.admin.clone();
            let state = self.state.clone();
            let admin_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                if let Err(e) = admin::serve(&admin_config, state, admin_shutdown).await {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(recv_shutdown(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Apply reloaded configs until the channel closes or shutdown fires.
async fn apply_config_updates(
    state: GuardState,
    mut updates: mpsc::UnboundedReceiver<GuardConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                match state.reload(&config) {
                    Ok(()) => tracing::info!("Configuration reloaded"),
                    Err(e) => tracing::error!(error = %e, "Rejected reloaded configuration, keeping current"),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}

/// Guard pipeline in front of the forwarding handler, plus transport layers.
#[allow(deprecated)]
pub fn build_router(config: &GuardConfig, state: GuardState, upstream: UpstreamState) -> Router {
    let forwarding = Router::new().fallback(forward_handler).with_state(upstream);

    apply_guard(forwarding, state).layer(
        ServiceBuilder::new()
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    path = %logging::display_path(req.uri().path()),
                    request_id = %request_id(req),
                )
            }))
            .layer(propagate_request_id_layer())
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs))),
    )
}

/// Forward one admitted request to the upstream.
async fn forward_handler(State(upstream): State<UpstreamState>, req: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&req);
    let (mut parts, body) = req.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(upstream.authority.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            return GuardRejection::UpstreamFailed.into_response();
        }
    };
    parts.version = Version::HTTP_11;

    match upstream.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_upstream(response.status().as_u16(), start);
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                upstream = %upstream.authority,
                error = %e,
                "Upstream request failed"
            );
            metrics::record_upstream(GuardRejection::UpstreamFailed.status().as_u16(), start);
            GuardRejection::UpstreamFailed.into_response()
        }
    }
}
