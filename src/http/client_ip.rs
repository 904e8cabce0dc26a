//! Best-effort client identity resolution.

use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// Resolves the identity a request is counted under.
///
/// The peer socket address is authoritative unless forwarded headers are
/// explicitly trusted, since any client can set them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientResolver {
    trust_forwarded_headers: bool,
}

impl ClientResolver {
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self {
            trust_forwarded_headers,
        }
    }

    /// Resolve the client IP, or `None` if nothing identifies the caller.
    pub fn resolve(&self, req: &Request) -> Option<String> {
        if self.trust_forwarded_headers {
            if let Some(ip) = forwarded_ip(req.headers()) {
                return Some(ip.to_string());
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    }
}

/// First valid address from `X-Forwarded-For`, then `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    from_forwarded.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(headers: &[(&str, &str)], peer: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/completions");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            req.extensions_mut().insert(ConnectInfo(addr));
        }
        req
    }

    #[test]
    fn test_peer_address_used_by_default() {
        let req = request(&[("x-forwarded-for", "10.9.9.9")], Some("192.0.2.10:5555"));
        assert_eq!(
            ClientResolver::default().resolve(&req).as_deref(),
            Some("192.0.2.10")
        );
    }

    #[test]
    fn test_forwarded_for_first_hop_when_trusted() {
        let req = request(
            &[("x-forwarded-for", "203.0.113.5, 10.0.0.1")],
            Some("10.0.0.1:80"),
        );
        assert_eq!(
            ClientResolver::new(true).resolve(&req).as_deref(),
            Some("203.0.113.5")
        );
    }

    #[test]
    fn test_real_ip_fallback_when_forwarded_invalid() {
        let req = request(
            &[("x-forwarded-for", "garbage"), ("x-real-ip", "2001:db8::7")],
            Some("10.0.0.1:80"),
        );
        assert_eq!(
            ClientResolver::new(true).resolve(&req).as_deref(),
            Some("2001:db8::7")
        );
    }

    #[test]
    fn test_unidentifiable_request() {
        let req = request(&[], None);
        assert_eq!(ClientResolver::new(true).resolve(&req), None);
    }
}
