//! Limiter policy: the default rate, identity lookups and key filters.

use std::collections::BTreeSet;
use std::time::Duration;

use super::counter::LimitValue;
use super::identity::IdentityLookup;

pub const DEFAULT_MESSAGE: &str = "You have reached maximum request limit.";
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const DEFAULT_STATUS_CODE: u16 = 429;

/// Configuration for one limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterPolicy {
    /// Rate applied when no route override matches
    pub default_limit: LimitValue,
    /// Places to look up the client address, in order
    pub ip_lookups: Vec<IdentityLookup>,
    /// HTTP methods to limit. Empty skips the method dimension.
    pub methods: BTreeSet<String>,
    /// HTTP headers to limit by. Empty skips the header dimension.
    pub headers: Vec<String>,
    /// Basic auth usernames to limit. Empty skips the auth dimension.
    pub basic_auth_users: BTreeSet<String>,
    /// Body of the rejection response
    pub message: String,
    /// Content type of the rejection response
    pub content_type: String,
    /// Status code of the rejection response
    pub status_code: u16,
}

impl LimiterPolicy {
    /// A policy admitting `max` requests per `window` per client and path.
    pub fn new(max: u64, window: Duration) -> Self {
        Self {
            default_limit: LimitValue::new(max, window),
            ip_lookups: IdentityLookup::default_order(),
            methods: BTreeSet::new(),
            headers: Vec::new(),
            basic_auth_users: BTreeSet::new(),
            message: DEFAULT_MESSAGE.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            status_code: DEFAULT_STATUS_CODE,
        }
    }

    pub fn with_ip_lookups(mut self, lookups: impl IntoIterator<Item = IdentityLookup>) -> Self {
        self.ip_lookups = lookups.into_iter().collect();
        self
    }

    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_basic_auth_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.basic_auth_users = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Which key layout this policy produces.
    pub fn key_shape(&self) -> KeyShape {
        KeyShape::from_filters(
            !self.methods.is_empty(),
            !self.headers.is_empty(),
            !self.basic_auth_users.is_empty(),
        )
    }
}

/// The eight key layouts, selected by which filters a policy sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyShape {
    /// `[identity, path]`
    Default,
    /// `[identity, path, method]`
    Method,
    /// `[identity, path, header, value]` per present header
    Headers,
    /// `[identity, path, username]`
    BasicAuth,
    /// `[identity, path, method, header, value]` per present header
    MethodHeaders,
    /// `[identity, path, method, username]`
    MethodBasicAuth,
    /// `[identity, path, method, header, username]` per present header
    HeadersBasicAuth,
    /// `[identity, path, method, header, value, username]` per present header
    All,
}

impl KeyShape {
    pub fn from_filters(methods: bool, headers: bool, basic_auth: bool) -> Self {
        match (methods, headers, basic_auth) {
            (false, false, false) => KeyShape::Default,
            (true, false, false) => KeyShape::Method,
            (false, true, false) => KeyShape::Headers,
            (false, false, true) => KeyShape::BasicAuth,
            (true, true, false) => KeyShape::MethodHeaders,
            (true, false, true) => KeyShape::MethodBasicAuth,
            (false, true, true) => KeyShape::HeadersBasicAuth,
            (true, true, true) => KeyShape::All,
        }
    }

    pub fn gates_on_method(&self) -> bool {
        matches!(
            self,
            KeyShape::Method | KeyShape::MethodHeaders | KeyShape::MethodBasicAuth | KeyShape::All
        )
    }

    pub fn uses_headers(&self) -> bool {
        matches!(
            self,
            KeyShape::Headers | KeyShape::MethodHeaders | KeyShape::HeadersBasicAuth | KeyShape::All
        )
    }

    pub fn gates_on_basic_auth(&self) -> bool {
        matches!(
            self,
            KeyShape::BasicAuth
                | KeyShape::MethodBasicAuth
                | KeyShape::HeadersBasicAuth
                | KeyShape::All
        )
    }
}
