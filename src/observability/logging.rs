//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (pretty for development, JSON for production)
//! - Redact client addresses and identifier-like path segments in production
//!
//! `RUST_LOG` overrides the configured level when set.

use std::net::IpAddr;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Environment, LogFormat, ObservabilityConfig};

static REDACT: OnceLock<bool> = OnceLock::new();

/// Install the global subscriber. Safe to call once per process.
pub fn init_logging(config: &ObservabilityConfig) {
    let _ = REDACT.set(config.environment == Environment::Production);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("request_guard={level},tower_http={level}", level = config.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }
}

fn redacting() -> bool {
    REDACT.get().copied().unwrap_or(false)
}

/// Client identifier as it should appear in logs.
pub fn display_origin(origin: &str) -> String {
    if redacting() {
        mask_address(origin)
    } else {
        origin.to_string()
    }
}

/// Request path as it should appear in logs.
pub fn display_path(path: &str) -> String {
    if redacting() {
        mask_path(path)
    } else {
        path.to_string()
    }
}

/// Zero the last octet of an IPv4 address (last group for IPv6).
/// Anything that is not an IP address is returned unchanged.
pub fn mask_address(origin: &str) -> String {
    match origin.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            format!("{}.{}.{}.x", a, b, c)
        }
        Ok(IpAddr::V6(v6)) => {
            let segments = v6.segments();
            let shown: Vec<String> = segments[..7].iter().map(|s| format!("{:x}", s)).collect();
            format!("{}:x", shown.join(":"))
        }
        Err(_) => origin.to_string(),
    }
}

/// Replace path segments that look like identifiers with `:id`.
pub fn mask_path(path: &str) -> String {
    path.split('/')
        .map(|segment| if looks_like_identifier(segment) { ":id" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}

fn looks_like_identifier(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    if segment.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    if uuid::Uuid::parse_str(segment).is_ok() {
        return true;
    }
    // long hex blobs: object ids, hashes, tokens
    segment.len() >= 16 && segment.bytes().all(|b| b.is_ascii_hexdigit())
}
