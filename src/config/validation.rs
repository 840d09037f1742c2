//! Configuration validation.
//!
//! Serde handles syntax; this module checks values ranges and the
//! invariants the guard relies on at runtime (mandatory default policy,
//! non-zero windows and intervals). All errors are reported, not just the
//! first.

use std::net::SocketAddr;

use axum::http::{uri::Authority, HeaderName};
use thiserror::Error;

use crate::config::schema::{GuardConfig, DEFAULT_POLICY_KEY};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("rate_limit.policies must contain a `default` entry")]
    MissingDefaultPolicy,

    #[error("rate_limit.policies.{0}: max_requests must be greater than zero")]
    ZeroMaxRequests(String),

    #[error("rate_limit.policies.{0}: window_ms must be greater than zero")]
    ZeroWindow(String),

    #[error("{0}: must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{field}: `{value}` is not a valid address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{section}: path `{path}` must start with `/`")]
    InvalidPath { section: &'static str, path: String },

    #[error("{0}: must not be empty")]
    Empty(&'static str),

    #[error("{field}: `{value}` is not a valid header name")]
    InvalidHeaderName { field: &'static str, value: String },
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_nonzero(&mut errors, "listener.max_body_bytes", config.listener.max_body_bytes as u64);
    check_nonzero(
        &mut errors,
        "listener.request_timeout_secs",
        config.listener.request_timeout_secs,
    );

    let upstream = config.upstream.address.trim();
    if upstream.is_empty() {
        errors.push(ValidationError::Empty("upstream.address"));
    } else if upstream.parse::<Authority>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "upstream.address",
            value: upstream.to_string(),
        });
    }

    let rate_limit = &config.rate_limit;
    if !rate_limit.policies.contains_key(DEFAULT_POLICY_KEY) {
        errors.push(ValidationError::MissingDefaultPolicy);
    }
    for (path, policy) in &rate_limit.policies {
        if path != DEFAULT_POLICY_KEY && !path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                section: "rate_limit.policies",
                path: path.clone(),
            });
        }
        if policy.max_requests == 0 {
            errors.push(ValidationError::ZeroMaxRequests(path.clone()));
        }
        if policy.window_ms == 0 {
            errors.push(ValidationError::ZeroWindow(path.clone()));
        }
    }
    check_nonzero(&mut errors, "rate_limit.sweep_interval_secs", rate_limit.sweep_interval_secs);

    let csrf = &config.csrf;
    check_nonzero(&mut errors, "csrf.token_ttl_secs", csrf.token_ttl_secs);
    check_nonzero(&mut errors, "csrf.sweep_interval_secs", csrf.sweep_interval_secs);
    check_header(&mut errors, "csrf.header_name", &csrf.header_name);

    let webhook = &config.webhook;
    for path in &webhook.paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                section: "webhook.paths",
                path: path.clone(),
            });
        }
    }
    check_header(&mut errors, "webhook.signature_header", &webhook.signature_header);
    check_nonzero(&mut errors, "webhook.tolerance_secs", webhook.tolerance_secs);

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::ZeroValue(field));
    }
}

fn check_header(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::Empty(field));
    } else if HeaderName::from_bytes(value.trim().as_bytes()).is_err() {
        errors.push(ValidationError::InvalidHeaderName {
            field,
            value: value.to_string(),
        });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointPolicyConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GuardConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = GuardConfig::default();
        config.rate_limit.policies.remove(DEFAULT_POLICY_KEY);
        config.rate_limit.policies.insert(
            "api/no-slash".into(),
            EndpointPolicyConfig {
                max_requests: 0,
                window_ms: 0,
            },
        );
        config.csrf.token_ttl_secs = 0;
        config.listener.bind_address = "not-an-address".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MissingDefaultPolicy));
        assert!(errors.contains(&ValidationError::ZeroMaxRequests("api/no-slash".into())));
        assert!(errors.contains(&ValidationError::ZeroWindow("api/no-slash".into())));
        assert!(errors.contains(&ValidationError::ZeroValue("csrf.token_ttl_secs")));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidPath { .. })));
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidAddress { .. })));
    }

    #[test]
    fn test_header_names_are_checked() {
        let mut config = GuardConfig::default();
        config.csrf.header_name = "x csrf".into();
        config.webhook.signature_header = " ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidHeaderName {
                    field: "csrf.header_name",
                    value: "x csrf".into(),
                },
                ValidationError::Empty("webhook.signature_header"),
            ]
        );
    }

    #[test]
    fn test_upstream_accepts_host_names() {
        let mut config = GuardConfig::default();
        config.upstream.address = "app.internal:3000".into();
        assert_eq!(validate_config(&config), Ok(()));

        config.upstream.address = "http://app.internal/".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_webhook_paths_must_be_absolute() {
        let mut config = GuardConfig::default();
        config.webhook.paths.push("hooks/github".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidPath {
                section: "webhook.paths",
                path: "hooks/github".into(),
            }]
        );
    }
}
