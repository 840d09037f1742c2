//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Browser-originated request:
//!     → rate_limit.rs (per-origin, per-endpoint fixed window)
//!     → csrf.rs (issue on safe methods, validate + consume otherwise)
//!     → upstream handler
//!
//! Signed callback (webhook path):
//!     → webhook.rs (HMAC-SHA256 + replay window)
//!     → upstream handler
//!
//! Background:
//!     sweeper.rs → rate_limit table, csrf token store
//! ```
//!
//! All components are synchronous decisions over in-memory state; the
//! caller supplies `now` in milliseconds since the Unix epoch.

pub mod csrf;
pub mod rate_limit;
pub mod sweeper;
pub mod webhook;

use std::time::{SystemTime, UNIX_EPOCH};

pub use csrf::{CsrfTokenManager, TokenRejection};
pub use rate_limit::{Decision, EndpointPolicy, PolicyTable, RateLimiter};
pub use sweeper::{Sweepable, Sweeper};
pub use webhook::{SignatureError, WebhookSignatureVerifier};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
