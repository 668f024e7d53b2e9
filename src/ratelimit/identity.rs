//! Client identity extraction.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::request::RequestInfo;
use crate::error::TollgateError;

/// Where to look for the client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityLookup {
    /// The immediate peer address, port stripped
    #[serde(rename = "RemoteAddr")]
    RemoteAddr,
    /// First entry of the `X-Forwarded-For` chain
    #[serde(rename = "X-Forwarded-For")]
    XForwardedFor,
    /// The `X-Real-IP` header, verbatim
    #[serde(rename = "X-Real-IP")]
    XRealIp,
}

impl IdentityLookup {
    /// The default order: peer address first, then proxy headers.
    pub fn default_order() -> Vec<IdentityLookup> {
        vec![
            IdentityLookup::RemoteAddr,
            IdentityLookup::XForwardedFor,
            IdentityLookup::XRealIp,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityLookup::RemoteAddr => "RemoteAddr",
            IdentityLookup::XForwardedFor => "X-Forwarded-For",
            IdentityLookup::XRealIp => "X-Real-IP",
        }
    }

    fn lookup(&self, request: &RequestInfo) -> Option<String> {
        match self {
            IdentityLookup::RemoteAddr => {
                let addr = strip_port(&request.remote_addr);
                (!addr.is_empty()).then(|| addr.to_string())
            }
            IdentityLookup::XForwardedFor => request
                .header("X-Forwarded-For")
                .and_then(|chain| chain.split(',').next())
                .map(str::trim)
                .filter(|first| !first.is_empty())
                .map(str::to_string),
            IdentityLookup::XRealIp => request.header("X-Real-IP").map(str::to_string),
        }
    }
}

impl fmt::Display for IdentityLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityLookup {
    type Err = TollgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RemoteAddr" => Ok(IdentityLookup::RemoteAddr),
            "X-Forwarded-For" => Ok(IdentityLookup::XForwardedFor),
            "X-Real-IP" => Ok(IdentityLookup::XRealIp),
            other => Err(TollgateError::UnknownLookup(other.to_string())),
        }
    }
}

/// Resolve the client identity for `request`.
///
/// The first lookup yielding a non-empty value wins. An empty result means
/// the request is not rate limited.
pub fn resolve_identity(lookups: &[IdentityLookup], request: &RequestInfo) -> String {
    lookups
        .iter()
        .find_map(|lookup| lookup.lookup(request))
        .unwrap_or_default()
}

/// Drop the port from a peer address.
///
/// Bare IPv6 addresses are returned whole rather than losing their last
/// group to a naive split on `:`.
fn strip_port(addr: &str) -> &str {
    if addr.parse::<IpAddr>().is_ok() {
        return addr;
    }
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        if sock.is_ipv6() {
            // "[v6]:port" -> "v6"
            if let Some(end) = addr.find(']') {
                return &addr[1..end];
            }
        }
    }
    match addr.rfind(':') {
        Some(idx) => &addr[..idx],
        None => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request() -> RequestInfo {
        RequestInfo::new(Method::GET, "/")
    }

    #[test]
    fn test_remote_addr_strips_port() {
        let req = request().with_remote_addr("192.168.1.10:54321");
        assert_eq!(
            resolve_identity(&[IdentityLookup::RemoteAddr], &req),
            "192.168.1.10"
        );
    }

    #[test]
    fn test_remote_addr_without_port_is_unchanged() {
        let req = request().with_remote_addr("192.168.1.10");
        assert_eq!(
            resolve_identity(&[IdentityLookup::RemoteAddr], &req),
            "192.168.1.10"
        );
    }

    #[test]
    fn test_remote_addr_ipv6() {
        let bracketed = request().with_remote_addr("[2601:7:1c82::b8c8]:8080");
        assert_eq!(
            resolve_identity(&[IdentityLookup::RemoteAddr], &bracketed),
            "2601:7:1c82::b8c8"
        );

        let bare = request().with_remote_addr("2601:7:1c82:4097:59a0:a80b:2841:b8c8");
        assert_eq!(
            resolve_identity(&[IdentityLookup::RemoteAddr], &bare),
            "2601:7:1c82:4097:59a0:a80b:2841:b8c8"
        );
    }

    #[test]
    fn test_remote_addr_non_ip_strips_last_segment() {
        let req = request().with_remote_addr("pipe:worker:7");
        assert_eq!(
            resolve_identity(&[IdentityLookup::RemoteAddr], &req),
            "pipe:worker"
        );
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let req = request().with_header("X-Forwarded-For", " 203.0.113.7 , 10.0.0.1, 10.0.0.2");
        assert_eq!(
            resolve_identity(&[IdentityLookup::XForwardedFor], &req),
            "203.0.113.7"
        );
    }

    #[test]
    fn test_real_ip_verbatim() {
        let req = request().with_header("X-Real-IP", "2601:7:1c82:4097:59a0:a80b:2841:b8c8");
        assert_eq!(
            resolve_identity(&[IdentityLookup::XRealIp], &req),
            "2601:7:1c82:4097:59a0:a80b:2841:b8c8"
        );
    }

    #[test]
    fn test_order_is_respected() {
        let req = request()
            .with_remote_addr("10.0.0.1:1234")
            .with_header("X-Real-IP", "203.0.113.9");

        let peer_first = [IdentityLookup::RemoteAddr, IdentityLookup::XRealIp];
        assert_eq!(resolve_identity(&peer_first, &req), "10.0.0.1");

        let header_first = [IdentityLookup::XRealIp, IdentityLookup::RemoteAddr];
        assert_eq!(resolve_identity(&header_first, &req), "203.0.113.9");
    }

    #[test]
    fn test_falls_through_empty_sources() {
        let req = request().with_header("X-Real-IP", "203.0.113.9");
        assert_eq!(
            resolve_identity(&IdentityLookup::default_order(), &req),
            "203.0.113.9"
        );
    }

    #[test]
    fn test_no_source_yields_empty_identity() {
        assert_eq!(resolve_identity(&IdentityLookup::default_order(), &request()), "");
        assert_eq!(resolve_identity(&[], &request().with_remote_addr("1.2.3.4:5")), "");
    }

    #[test]
    fn test_parse_lookup_names() {
        assert_eq!(
            "X-Forwarded-For".parse::<IdentityLookup>().unwrap(),
            IdentityLookup::XForwardedFor
        );
        assert!(matches!(
            "X-Client-IP".parse::<IdentityLookup>(),
            Err(TollgateError::UnknownLookup(name)) if name == "X-Client-IP"
        ));
    }
}
