//! The request attributes the engine reads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// Username and password decoded from a Basic `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// A framework-neutral view of an inbound HTTP request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Immediate peer address as reported by the server, usually `ip:port`
    pub remote_addr: String,
    pub method: Method,
    /// URL path without the query string
    pub path: String,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            remote_addr: String::new(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = remote_addr.into();
        self
    }

    /// Add a header. Names or values that are not valid HTTP are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_basic_auth(self, username: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        self.with_header(AUTHORIZATION.as_str(), &format!("Basic {encoded}"))
    }

    /// First value of header `name`, looked up case-insensitively.
    ///
    /// Missing, empty and non-UTF-8 values all read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    /// Decode Basic credentials. Anything malformed reads as no credentials.
    pub fn basic_auth(&self) -> Option<BasicCredentials> {
        let value = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }

        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;

        Some(BasicCredentials {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

impl<B> From<&http::Request<B>> for RequestInfo {
    fn from(req: &http::Request<B>) -> Self {
        Self {
            remote_addr: String::new(),
            method: req.method().clone(),
            path: req.uri().path().to_string(),
            headers: req.headers().clone(),
        }
    }
}
