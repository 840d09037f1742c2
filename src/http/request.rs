//! Request identification.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) as early as possible and echo it back
//! - Resolve the origin identifier used for rate limiting and CSRF binding

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Origin used when neither the socket nor a trusted header names the caller.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Layer that assigns an `X-Request-ID` when the client did not send one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Layer that copies the request ID onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Request ID header value, or `"unknown"`.
pub fn request_id<B>(req: &Request<B>) -> String {
    req.headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Stable identifier for the caller.
///
/// The socket peer IP, or the first `X-Forwarded-For` hop when the
/// deployment sits behind a proxy that overwrites that header.
pub fn client_origin<B>(req: &Request<B>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first_hop) = forwarded {
            return first_hop.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_from(addr: &str, forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/orders");
        if let Some(value) = forwarded {
            builder = builder.header(X_FORWARDED_FOR, value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        req
    }

    #[test]
    fn test_socket_origin() {
        let req = request_from("198.51.100.7:50123", Some("203.0.113.1"));
        assert_eq!(client_origin(&req, false), "198.51.100.7");
    }

    #[test]
    fn test_forwarded_origin_when_trusted() {
        let req = request_from("10.0.0.2:443", Some(" 203.0.113.1 , 10.0.0.2"));
        assert_eq!(client_origin(&req, true), "203.0.113.1");

        let req = request_from("10.0.0.2:443", Some(""));
        assert_eq!(client_origin(&req, true), "10.0.0.2");
    }

    #[test]
    fn test_unknown_origin_without_connect_info() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_origin(&req, true), UNKNOWN_ORIGIN);
        assert_eq!(request_id(&req), "unknown");
    }
}
