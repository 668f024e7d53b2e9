//! Rate limiting logic and state management.

mod admission;
mod clock;
mod counter;
mod identity;
mod key;
mod limiter;
mod overrides;
mod policy;
mod registry;
mod request;

pub use admission::{AdmissionController, FailMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{Counter, CounterBackend, FixedWindowCounter, LimitValue, LocalCounterBackend};
pub use identity::{resolve_identity, IdentityLookup};
pub use key::{build_keys, RateLimitKey};
pub use limiter::{RateLimiter, RejectionReason};
pub use overrides::{RouteOverride, RouteOverrideTable};
pub use policy::{
    KeyShape, LimiterPolicy, DEFAULT_CONTENT_TYPE, DEFAULT_MESSAGE, DEFAULT_STATUS_CODE,
};
pub use registry::{LimiterRegistry, DEFAULT_BACKEND_TIMEOUT};
pub use request::{BasicCredentials, RequestInfo};
