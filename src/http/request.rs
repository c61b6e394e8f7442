//! Request identity: correlation IDs and client addresses.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing, reused when the
//!   caller already sent one
//! - Forwarded headers are only believed when configured; otherwise the
//!   socket peer is the client

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

pub use tower_http::request_id::MakeRequestUuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Client identifier used when no address can be resolved.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Request id logged when the header is missing or not valid text.
pub const NO_REQUEST_ID: &str = "-";

/// Assigns a UUID `x-request-id` to requests that arrive without one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Copies the request's `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

pub fn request_id<B>(req: &Request<B>) -> String {
    req.headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(NO_REQUEST_ID)
        .to_string()
}

/// Resolve the client address a request came from.
///
/// With `trust_forwarded`, the first `x-forwarded-for` entry wins, then
/// `x-real-ip`. Otherwise (or when neither is present) the socket peer.
pub fn client_ip<B>(req: &Request<B>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = req
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }

        let real_ip = req
            .headers()
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = real_ip {
            return ip.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/products");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_first_forwarded_entry_wins() {
        let req = request(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "10.0.0.2")]);
        assert_eq!(client_ip(&req, true), "203.0.113.7");
    }

    #[test]
    fn test_real_ip_when_no_forwarded_for() {
        let req = request(&[("x-real-ip", "198.51.100.4")]);
        assert_eq!(client_ip(&req, true), "198.51.100.4");
    }

    #[test]
    fn test_untrusted_headers_are_ignored() {
        let mut req = request(&[("x-forwarded-for", "203.0.113.7")]);
        assert_eq!(client_ip(&req, false), UNKNOWN_CLIENT);

        let peer: SocketAddr = "192.0.2.10:5000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        assert_eq!(client_ip(&req, false), "192.0.2.10");
    }

    #[test]
    fn test_request_id_falls_back_to_placeholder() {
        assert_eq!(request_id(&request(&[("x-request-id", "abc")])), "abc");
        assert_eq!(request_id(&request(&[])), NO_REQUEST_ID);
        assert_ne!(NO_REQUEST_ID, UNKNOWN_CLIENT);
    }

    #[test]
    fn test_unknown_without_any_source() {
        assert_eq!(client_ip(&request(&[]), true), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_request_id_header() {
        let req = request(&[("x-request-id", "abc-123")]);
        assert_eq!(request_id(&req), "abc-123");
        assert_eq!(request_id(&request(&[])), "unknown");
    }
}
