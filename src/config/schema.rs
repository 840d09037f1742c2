//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the mandatory fallback entry in the policy table.
pub const DEFAULT_POLICY_KEY: &str = "default";

/// Root configuration for the request guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Upstream service that admitted requests are forwarded to.
    pub upstream: UpstreamConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// CSRF token lifecycle configuration.
    pub csrf: CsrfConfig,

    /// Webhook signature verification configuration.
    pub webhook: WebhookConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            request_timeout_secs: 30,
        }
    }
}

/// Upstream service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// A single fixed-window policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointPolicyConfig {
    /// Requests admitted per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl EndpointPolicyConfig {
    const fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_ms: 60_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Use the first `X-Forwarded-For` hop as the origin identifier.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Interval between garbage-collection sweeps in seconds.
    pub sweep_interval_secs: u64,

    /// Endpoint path -> policy. Must contain a `default` entry.
    pub policies: BTreeMap<String, EndpointPolicyConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let policies = [
            (DEFAULT_POLICY_KEY, EndpointPolicyConfig::per_minute(60)),
            ("/api/auth/login", EndpointPolicyConfig::per_minute(5)),
            ("/api/auth/register", EndpointPolicyConfig::per_minute(5)),
            ("/api/auth/password-reset", EndpointPolicyConfig::per_minute(5)),
            ("/api/contact", EndpointPolicyConfig::per_minute(10)),
            ("/api/checkout", EndpointPolicyConfig::per_minute(20)),
            ("/api/search", EndpointPolicyConfig::per_minute(30)),
        ]
        .into_iter()
        .map(|(path, policy)| (path.to_string(), policy))
        .collect();

        Self {
            enabled: true,
            trust_forwarded_for: false,
            sweep_interval_secs: 300,
            policies,
        }
    }
}

/// CSRF token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Enable CSRF protection for state-changing requests.
    pub enabled: bool,

    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// Interval between expiry sweeps in seconds.
    pub sweep_interval_secs: u64,

    /// Header carrying the token in both directions.
    pub header_name: String,

    /// Body fields checked when the header is absent.
    pub body_fields: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_ttl_secs: 3600,
            sweep_interval_secs: 300,
            header_name: "x-csrf-token".to_string(),
            body_fields: vec!["_csrf".to_string(), "csrfToken".to_string()],
        }
    }
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Paths served as signed callbacks (exact match).
    pub paths: Vec<String>,

    /// Header carrying `t=<secs>,v1=<hex>`.
    pub signature_header: String,

    /// Inline secret. Prefer `secret_env` outside of tests.
    pub secret: Option<String>,

    /// Environment variable holding the shared secret.
    pub secret_env: String,

    /// Environment variable holding the previous secret during rotation.
    pub previous_secret_env: Option<String>,

    /// Accepted clock skew for the signed timestamp, in seconds.
    pub tolerance_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            paths: vec!["/api/webhooks/stripe".to_string()],
            signature_header: "stripe-signature".to_string(),
            secret: None,
            secret_env: "WEBHOOK_SECRET".to_string(),
            previous_secret_env: None,
            tolerance_secs: 300,
        }
    }
}

impl WebhookConfig {
    /// Resolve the active secret: inline value first, then the environment.
    pub fn resolve_secret(&self) -> Option<String> {
        self.secret
            .clone()
            .or_else(|| std::env::var(&self.secret_env).ok())
            .filter(|s| !s.is_empty())
    }

    /// Resolve the previous secret, if rotation is configured.
    pub fn resolve_previous_secret(&self) -> Option<String> {
        self.previous_secret_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|s| !s.is_empty())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Deployment environment; drives log redaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Production masks client addresses and identifier path segments.
    pub environment: Environment,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            environment: Environment::Development,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// Environment variable holding the bearer key.
    pub api_key_env: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: "GUARD_ADMIN_KEY".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
