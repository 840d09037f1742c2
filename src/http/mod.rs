//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit)
//!     → pipeline.rs (guard middleware)
//!         webhook path  → middleware/webhook.rs
//!         anything else → middleware/rate_limit.rs → middleware/csrf.rs
//!     → server.rs (forward to upstream)
//!     → response.rs (rejections, X-RateLimit-* headers)
//! ```

pub mod middleware;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::{apply_guard, guard_middleware, GuardSettings, GuardState};
pub use request::X_REQUEST_ID;
pub use response::GuardRejection;
pub use server::HttpServer;
