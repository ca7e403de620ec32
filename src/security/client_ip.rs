//! Client address resolution.
//!
//! Priority: `CF-Connecting-IP`, first `X-Forwarded-For` entry, transport peer,
//! then [`FALLBACK_CLIENT_IP`]. Traffic reaches the gateway through our own tunnel,
//! so the proxy headers are trusted.

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};

/// Header injected by the tunnel edge.
pub const CF_CONNECTING_IP: &str = "cf-connecting-ip";

/// Standard forwarded-for header.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Used when no source yields an address. Matches no configured range.
pub const FALLBACK_CLIENT_IP: &str = "0.0.0.0";

/// The resolved caller address for one request.
///
/// Kept as a string: a malformed proxy header is carried through and denied later
/// rather than rejected here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(ip: impl Into<String>) -> Self {
        Self(ip.into())
    }

    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        if let Some(ip) = header_str(headers, CF_CONNECTING_IP) {
            return Self(ip.trim().to_string());
        }

        if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR) {
            let first = forwarded.split(',').next().unwrap_or_default();
            return Self(first.trim().to_string());
        }

        match peer {
            Some(addr) => Self(addr.ip().to_string()),
            None => Self(FALLBACK_CLIENT_IP.to_string()),
        }
    }

    /// Resolve from a request, using `ConnectInfo` for the peer when present.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self::resolve(req.headers(), peer)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A present, non-empty header value.
///
/// Bytes that are not valid UTF-8 are decoded lossily so the value still wins
/// its priority slot and later fails address parsing.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    headers
        .get(name)
        .filter(|value| !value.is_empty())
        .map(|value| match value.to_str() {
            Ok(text) => Cow::Borrowed(text),
            Err(_) => String::from_utf8_lossy(value.as_bytes()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::network::parse_client_addr;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.168.1.50:51234".parse().unwrap())
    }

    #[test]
    fn test_tunnel_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(CF_CONNECTING_IP, HeaderValue::from_static(" 160.79.104.10 "));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));
        let id = ClientIdentity::resolve(&headers, peer());
        assert_eq!(id.as_str(), "160.79.104.10");
    }

    #[test]
    fn test_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.5, 10.0.0.1, 127.0.0.1"),
        );
        let id = ClientIdentity::resolve(&headers, peer());
        assert_eq!(id.as_str(), "203.0.113.5");
    }

    #[test]
    fn test_peer_then_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(ClientIdentity::resolve(&headers, peer()).as_str(), "192.168.1.50");
        assert_eq!(
            ClientIdentity::resolve(&headers, None).as_str(),
            FALLBACK_CLIENT_IP
        );
    }

    #[test]
    fn test_empty_header_is_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(CF_CONNECTING_IP, HeaderValue::from_static(""));
        let id = ClientIdentity::resolve(&headers, peer());
        assert_eq!(id.as_str(), "192.168.1.50");
    }

    #[test]
    fn test_blank_header_is_not_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(CF_CONNECTING_IP, HeaderValue::from_static("   "));
        let id = ClientIdentity::resolve(&headers, peer());
        assert_eq!(id.as_str(), "");
        assert!(parse_client_addr(id.as_str()).is_none());
    }

    #[test]
    fn test_non_utf8_header_is_not_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_bytes(b"\xff\xfe").unwrap(),
        );
        let id = ClientIdentity::resolve(&headers, Some("127.0.0.1:9000".parse().unwrap()));
        assert_ne!(id.as_str(), "127.0.0.1");
        assert!(parse_client_addr(id.as_str()).is_none());
    }

    #[test]
    fn test_malformed_header_is_carried_through() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("garbage, 10.0.0.1"));
        let id = ClientIdentity::resolve(&headers, peer());
        assert_eq!(id.as_str(), "garbage");
        assert!(parse_client_addr(id.as_str()).is_none());
    }

    #[test]
    fn test_from_request_uses_connect_info() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("[::1]:4000".parse().unwrap()));
        assert_eq!(ClientIdentity::from_request(&req).as_str(), "::1");
    }
}
