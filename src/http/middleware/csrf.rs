//! CSRF step of the pipeline.
//!
//! Safe methods get a fresh token on the response. Every other method must
//! present a live token issued to the same origin, in the configured header
//! or in a JSON / form-urlencoded body field. A token gates exactly one
//! request.

use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header, HeaderMap, Method, Request},
};

use crate::http::pipeline::GuardSettings;
use crate::http::response::GuardRejection;
use crate::observability::{logging, metrics};
use crate::security::{CsrfTokenManager, TokenRejection};

/// Read-only, idempotent methods that never need a token.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Validate and consume the request's token, returning the request with
/// its body restored.
pub async fn enforce_csrf(
    manager: &CsrfTokenManager,
    settings: &GuardSettings,
    origin: &str,
    req: Request<Body>,
    now: u64,
) -> Result<Request<Body>, GuardRejection> {
    let path = req.uri().path().to_string();

    let from_header = req
        .headers()
        .get(&settings.csrf_header)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let (token, req) = match from_header {
        Some(token) => (Some(token), req),
        None => {
            let (parts, body) = req.into_parts();
            let bytes = to_bytes(body, settings.max_body_bytes)
                .await
                .map_err(|_| GuardRejection::PayloadTooLarge)?;
            let token = token_from_body(&parts.headers, &bytes, &settings.csrf_body_fields);
            (token, Request::from_parts(parts, Body::from(bytes)))
        }
    };

    let result = match token.as_deref() {
        Some(token) => manager.validate_and_consume(token, origin, now),
        None => Err(TokenRejection::Malformed),
    };

    match result {
        Ok(()) => Ok(req),
        Err(reason) => {
            let reason = if token.is_none() { "missing" } else { reason.as_str() };
            metrics::record_csrf_rejection(reason);
            tracing::warn!(
                client = %logging::display_origin(origin),
                path = %logging::display_path(&path),
                reason,
                "CSRF token rejected"
            );
            Err(GuardRejection::CsrfInvalid)
        }
    }
}

/// Look for the token in a JSON object or a form-urlencoded body.
fn token_from_body(headers: &HeaderMap, body: &Bytes, fields: &[String]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;
        return fields
            .iter()
            .find_map(|field| value.get(field).and_then(|v| v.as_str()))
            .map(str::to_string);
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        return url::form_urlencoded::parse(body)
            .find(|(key, _)| fields.iter().any(|field| field == key))
            .map(|(_, value)| value.into_owned());
    }

    None
}
