//! Rate-limit key generation.

use std::fmt;

use super::policy::{KeyShape, LimiterPolicy};
use super::request::RequestInfo;

/// A key that uniquely identifies one independently limited request class.
///
/// Two keys are equal iff their components are equal in value and order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    components: Vec<String>,
}

impl RateLimitKey {
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Opaque key for counter backends.
    ///
    /// Each component is length-prefixed so no choice of component text can
    /// make two different keys collide.
    pub fn storage_key(&self) -> String {
        let mut out = String::new();
        for component in &self.components {
            out.push_str(&component.len().to_string());
            out.push(':');
            out.push_str(component);
        }
        out
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.components.join("|"))
    }
}

/// Build the keys to rate-limit `request` by.
///
/// An empty `identity` produces no keys. Otherwise the policy's
/// [`KeyShape`] decides the layout, and a failed method or credential gate
/// yields no keys.
pub fn build_keys(
    policy: &LimiterPolicy,
    identity: &str,
    request: &RequestInfo,
) -> Vec<RateLimitKey> {
    if identity.is_empty() {
        return Vec::new();
    }

    let shape = policy.key_shape();
    let path = request.path.as_str();
    let method = request.method.as_str();

    if shape.gates_on_method() && !policy.methods.contains(method) {
        return Vec::new();
    }

    let username = if shape.gates_on_basic_auth() {
        match request.basic_auth() {
            Some(creds) if policy.basic_auth_users.contains(&creds.username) => creds.username,
            _ => return Vec::new(),
        }
    } else {
        String::new()
    };

    match shape {
        KeyShape::Default => vec![RateLimitKey::new([identity, path])],
        KeyShape::Method => vec![RateLimitKey::new([identity, path, method])],
        KeyShape::BasicAuth => vec![RateLimitKey::new([identity, path, username.as_str()])],
        KeyShape::MethodBasicAuth => vec![RateLimitKey::new([
            identity,
            path,
            method,
            username.as_str(),
        ])],
        KeyShape::Headers => present_headers(policy, request)
            .map(|(name, value)| RateLimitKey::new([identity, path, name, value]))
            .collect(),
        KeyShape::MethodHeaders => present_headers(policy, request)
            .map(|(name, value)| RateLimitKey::new([identity, path, method, name, value]))
            .collect(),
        KeyShape::HeadersBasicAuth => present_headers(policy, request)
            .map(|(name, _)| RateLimitKey::new([identity, path, method, name, username.as_str()]))
            .collect(),
        KeyShape::All => present_headers(policy, request)
            .map(|(name, value)| {
                RateLimitKey::new([identity, path, method, name, value, username.as_str()])
            })
            .collect(),
    }
}

/// `(name, value)` for each policy header present on the request, in policy
/// order.
fn present_headers<'a>(
    policy: &'a LimiterPolicy,
    request: &'a RequestInfo,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    policy
        .headers
        .iter()
        .filter_map(move |name| request.header(name).map(|value| (name.as_str(), value)))
}
