//! Request guard: admission control in front of an HTTP application.
//!
//! ```text
//!     Client ──▶ rate limit ──▶ CSRF ──▶ upstream
//!     Signed callback ──▶ webhook signature ──▶ upstream
//! ```
//!
//! The pipeline can run as a standalone forwarding server ([`HttpServer`])
//! or wrap an existing axum router in-process ([`apply_guard`]).

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GuardConfig;
pub use http::{apply_guard, GuardState, HttpServer};
pub use lifecycle::Shutdown;
pub use security::{CsrfTokenManager, RateLimiter, WebhookSignatureVerifier};
