//! Response handling for guard decisions.
//!
//! # Responsibilities
//! - Map rejections to status codes and the JSON error contract
//! - Add `X-RateLimit-*` and `Retry-After` headers
//!
//! Bodies never carry internal detail; the reason for a rejection is only
//! logged server-side.

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::security::Decision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Why the guard refused to pass a request on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardRejection {
    RateLimited(Decision),
    CsrfInvalid,
    WebhookSignatureMissing,
    WebhookSignatureInvalid,
    WebhookMisconfigured,
    PayloadTooLarge,
    UpstreamFailed,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    ok: bool,
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl GuardRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            GuardRejection::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GuardRejection::CsrfInvalid => StatusCode::FORBIDDEN,
            GuardRejection::WebhookSignatureMissing | GuardRejection::WebhookSignatureInvalid => {
                StatusCode::UNAUTHORIZED
            }
            GuardRejection::WebhookMisconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            GuardRejection::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GuardRejection::UpstreamFailed => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            GuardRejection::RateLimited(_) => "Too many requests. Please try again later.",
            GuardRejection::CsrfInvalid => "Invalid or missing CSRF token",
            GuardRejection::WebhookSignatureMissing => "Missing webhook signature",
            GuardRejection::WebhookSignatureInvalid => "Invalid webhook signature",
            GuardRejection::WebhookMisconfigured => "Webhook configuration error",
            GuardRejection::PayloadTooLarge => "Request body too large",
            GuardRejection::UpstreamFailed => "Upstream request failed",
        }
    }

    /// Outcome label for request metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            GuardRejection::RateLimited(_) => "rate_limited",
            GuardRejection::CsrfInvalid => "csrf_rejected",
            GuardRejection::WebhookSignatureMissing | GuardRejection::WebhookSignatureInvalid => {
                "webhook_rejected"
            }
            GuardRejection::WebhookMisconfigured => "webhook_misconfigured",
            GuardRejection::PayloadTooLarge => "payload_too_large",
            GuardRejection::UpstreamFailed => "upstream_failed",
        }
    }
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            GuardRejection::RateLimited(decision) => decision.retry_after_secs,
            _ => None,
        };
        let body = ErrorBody {
            ok: false,
            error: self.message(),
            retry_after,
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let GuardRejection::RateLimited(decision) = &self {
            apply_rate_limit_headers(response.headers_mut(), decision);
            if let Some(secs) = decision.retry_after_secs {
                response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
        }
        response
    }
}

/// Set the `X-RateLimit-*` headers for a decision.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Ok(value) = HeaderValue::from_str(&format_reset(decision.reset_at)) {
        headers.insert(X_RATELIMIT_RESET, value);
    }
}

/// ISO-8601 / RFC 3339 UTC timestamp for a millisecond epoch value.
pub fn format_reset(reset_at_ms: u64) -> String {
    let millis = i64::try_from(reset_at_ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
