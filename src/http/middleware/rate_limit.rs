//! Rate limit step of the pipeline.

use crate::http::response::GuardRejection;
use crate::observability::{logging, metrics};
use crate::security::{Decision, RateLimiter};

/// Admit or reject one request. Rejections are expected traffic, logged at debug.
pub fn enforce_rate_limit(
    limiter: &RateLimiter,
    origin: &str,
    path: &str,
    now: u64,
) -> Result<Decision, GuardRejection> {
    let decision = limiter.admit(origin, path, now);
    if decision.allowed {
        return Ok(decision);
    }

    let policies = limiter.policies();
    metrics::record_rate_limited(policies.policy_label(path));
    tracing::debug!(
        client = %logging::display_origin(origin),
        path = %logging::display_path(path),
        retry_after_secs = ?decision.retry_after_secs,
        "Rate limit exceeded"
    );
    Err(GuardRejection::RateLimited(decision))
}
