//! The request pipeline: rate limit → CSRF → handler, or webhook
//! verification → handler for signed callback paths.
//!
//! [`guard_middleware`] is an ordinary axum middleware; [`apply_guard`]
//! wraps any router with it so the guard can front handlers in-process as
//! well as the forwarding server.

use std::collections::HashSet;
use std::sync::{Arc, Once};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};

use crate::config::{GuardConfig, ValidationError};
use crate::http::middleware::{csrf, rate_limit, webhook};
use crate::http::request::{client_origin, UNKNOWN_ORIGIN};
use crate::http::response::apply_rate_limit_headers;
use crate::observability::metrics;
use crate::security::{now_millis, CsrfTokenManager, PolicyTable, RateLimiter, WebhookSignatureVerifier};

static UNKNOWN_ORIGIN_WARNING: Once = Once::new();

/// Request-path settings that can change on config reload.
#[derive(Debug, Clone)]
pub struct GuardSettings {
    pub rate_limit_enabled: bool,
    pub trust_forwarded_for: bool,
    pub csrf_enabled: bool,
    pub csrf_header: HeaderName,
    pub csrf_body_fields: Vec<String>,
    pub webhook_paths: HashSet<String>,
    pub webhook_header: HeaderName,
    /// Current secret first, then the rotation leftover. Empty when unconfigured.
    pub webhook_secrets: Vec<String>,
    pub max_body_bytes: usize,
}

impl GuardSettings {
    pub fn from_config(config: &GuardConfig) -> Result<Self, ValidationError> {
        let csrf_header = parse_header_name("csrf.header_name", &config.csrf.header_name)?;
        let webhook_header = parse_header_name("webhook.signature_header", &config.webhook.signature_header)?;

        let webhook_secrets = config
            .webhook
            .resolve_secret()
            .into_iter()
            .chain(config.webhook.resolve_previous_secret())
            .collect();

        Ok(Self {
            rate_limit_enabled: config.rate_limit.enabled,
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
            csrf_enabled: config.csrf.enabled,
            csrf_header,
            csrf_body_fields: config.csrf.body_fields.clone(),
            webhook_paths: config.webhook.paths.iter().cloned().collect(),
            webhook_header,
            webhook_secrets,
            max_body_bytes: config.listener.max_body_bytes,
        })
    }
}

fn parse_header_name(field: &'static str, value: &str) -> Result<HeaderName, ValidationError> {
    HeaderName::from_bytes(value.trim().as_bytes()).map_err(|_| ValidationError::InvalidHeaderName {
        field,
        value: value.to_string(),
    })
}

/// Shared state of the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct GuardState {
    pub rate_limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfTokenManager>,
    pub verifier: WebhookSignatureVerifier,
    pub settings: Arc<ArcSwap<GuardSettings>>,
}

impl GuardState {
    /// Build fresh stores from a validated configuration.
    pub fn from_config(config: &GuardConfig) -> Result<Self, ValidationError> {
        let policies = PolicyTable::try_from(&config.rate_limit.policies)?;
        let settings = GuardSettings::from_config(config)?;

        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(policies)),
            csrf: Arc::new(CsrfTokenManager::new(std::time::Duration::from_secs(
                config.csrf.token_ttl_secs,
            ))),
            verifier: WebhookSignatureVerifier::new(config.webhook.tolerance_secs.saturating_mul(1000)),
            settings: Arc::new(ArcSwap::from_pointee(settings)),
        })
    }

    /// Apply a reloaded configuration. Counters and tokens survive.
    pub fn reload(&self, config: &GuardConfig) -> Result<(), ValidationError> {
        let policies = PolicyTable::try_from(&config.rate_limit.policies)?;
        let settings = GuardSettings::from_config(config)?;
        self.rate_limiter.update_policies(policies);
        self.settings.store(Arc::new(settings));
        Ok(())
    }
}

/// Wrap `router` with the guard pipeline.
///
/// Callers are told apart by their socket address, so serve the result with
/// `into_make_service_with_connect_info::<SocketAddr>()` (or trust
/// `X-Forwarded-For`). Without either, every caller resolves to `"unknown"`
/// and shares one rate-limit bucket and one CSRF session.
pub fn apply_guard(router: Router, state: GuardState) -> Router {
    router.layer(middleware::from_fn_with_state(state, guard_middleware))
}

/// Middleware running the whole pipeline for one request.
pub async fn guard_middleware(
    State(state): State<GuardState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let settings = state.settings.load_full();
    let origin = client_origin(&req, settings.trust_forwarded_for);
    if origin == UNKNOWN_ORIGIN {
        UNKNOWN_ORIGIN_WARNING.call_once(|| {
            tracing::warn!("Caller address unavailable; all such requests share one rate-limit bucket and CSRF session");
        });
    }

    if settings.webhook_paths.contains(req.uri().path()) {
        return match webhook::enforce_webhook_signature(&state.verifier, &settings, &origin, req).await {
            Ok(req) => {
                metrics::record_request("webhook_verified");
                next.run(req).await
            }
            Err(rejection) => {
                metrics::record_request(rejection.outcome());
                rejection.into_response()
            }
        };
    }

    let now = now_millis();

    let decision = if settings.rate_limit_enabled {
        match rate_limit::enforce_rate_limit(&state.rate_limiter, &origin, req.uri().path(), now) {
            Ok(decision) => Some(decision),
            Err(rejection) => {
                metrics::record_request(rejection.outcome());
                return rejection.into_response();
            }
        }
    } else {
        None
    };

    let mut req = req;
    let mut issued_token = None;
    if settings.csrf_enabled {
        if csrf::is_safe_method(req.method()) {
            issued_token = Some(state.csrf.issue(&origin, now));
        } else {
            match csrf::enforce_csrf(&state.csrf, &settings, &origin, req, now).await {
                Ok(checked) => req = checked,
                Err(rejection) => {
                    metrics::record_request(rejection.outcome());
                    let mut response = rejection.into_response();
                    if let Some(decision) = &decision {
                        apply_rate_limit_headers(response.headers_mut(), decision);
                    }
                    return response;
                }
            }
        }
    }

    metrics::record_request("allowed");
    let mut response = next.run(req).await;

    if let Some(decision) = &decision {
        apply_rate_limit_headers(response.headers_mut(), decision);
    }
    if let Some(token) = issued_token {
        if let Ok(value) = HeaderValue::from_str(&token) {
            response.headers_mut().insert(settings.csrf_header.clone(), value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointPolicyConfig;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    fn guarded(config: &GuardConfig) -> (Router, GuardState) {
        let state = GuardState::from_config(config).unwrap();
        let app = Router::new()
            .route("/form", get(|| async { "form" }))
            .route("/api/contact", post(|| async { "sent" }))
            .route("/api/webhooks/stripe", post(|| async { "received" }));
        (apply_guard(app, state.clone()), state)
    }

    fn request(method: &str, path: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(path)
    }

    #[tokio::test]
    async fn test_safe_request_gets_token_and_limit_headers() {
        let (app, state) = guarded(&GuardConfig::default());
        let response = app.oneshot(request("GET", "/form").body(Body::empty()).unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "60");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "59");
        let token = response.headers()["x-csrf-token"].to_str().unwrap();
        assert!(state.csrf.contains(token));
    }

    #[tokio::test]
    async fn test_csrf_rejection_still_counts_and_carries_headers() {
        let (app, state) = guarded(&GuardConfig::default());
        let response = app
            .oneshot(request("POST", "/api/contact").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        let entry = state.rate_limiter.entry(UNKNOWN_ORIGIN, "/api/contact");
        assert_eq!(entry.map(|e| e.count), Some(1));
    }

    #[tokio::test]
    async fn test_webhook_path_skips_limiter() {
        let mut config = GuardConfig::default();
        config.webhook.secret = Some("whsec_test".into());
        let (app, state) = guarded(&config);

        let response = app
            .oneshot(request("POST", "/api/webhooks/stripe").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.rate_limiter.entry_count(), 0);
        assert!(state.csrf.is_empty());
    }

    #[tokio::test]
    async fn test_reload_swaps_policy_and_keeps_state() {
        let (app, state) = guarded(&GuardConfig::default());
        let token = state.csrf.issue(UNKNOWN_ORIGIN, now_millis());
        app.clone()
            .oneshot(request("GET", "/form").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let mut config = GuardConfig::default();
        config.rate_limit.policies.insert(
            "/form".into(),
            EndpointPolicyConfig {
                max_requests: 2,
                window_ms: 60_000,
            },
        );
        state.reload(&config).unwrap();

        let response = app.oneshot(request("GET", "/form").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(state.csrf.contains(&token));
    }

    #[tokio::test]
    async fn test_callers_with_connect_info_get_separate_buckets() {
        use axum::extract::ConnectInfo;
        use std::net::SocketAddr;

        let (app, state) = guarded(&GuardConfig::default());
        for addr in ["198.51.100.1:4000", "198.51.100.2:4000"] {
            let mut req = request("GET", "/form").body(Body::empty()).unwrap();
            req.extensions_mut().insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.headers()["x-ratelimit-remaining"], "59");
        }

        assert_eq!(state.rate_limiter.origin_count(), 2);
        assert_eq!(state.rate_limiter.entry(UNKNOWN_ORIGIN, "/form"), None);
    }

    #[test]
    fn test_reload_rejects_table_without_default() {
        let state = GuardState::from_config(&GuardConfig::default()).unwrap();
        let mut config = GuardConfig::default();
        config.rate_limit.policies.clear();
        assert_eq!(state.reload(&config), Err(ValidationError::MissingDefaultPolicy));
        assert_eq!(state.rate_limiter.policies().default_policy().max_requests, 60);
    }
}
