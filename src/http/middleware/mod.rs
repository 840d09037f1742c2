//! Pipeline steps. Each step takes the request, decides, and either hands
//! the request back (body restored if it was read) or returns a
//! [`GuardRejection`](crate::http::response::GuardRejection).

pub mod csrf;
pub mod rate_limit;
pub mod webhook;
