//! # Actix Middleware Library
//!
//! Session and request-gating middleware for IssueHub Actix services
//!
//! ## Modules
//! - `route_class`: public / static / protected path classification
//! - `claims_refresh`: periodic claims refresh and token-version revocation
//! - `trace_headers`: `x-method` / `x-pathname` / `x-user-id` propagation
//! - `session_gate`: the per-request gate tying the above together
//! - `logging`: request/response logging

pub mod claims_refresh;
pub mod logging;
pub mod route_class;
pub mod session_gate;
pub mod trace_headers;

pub use claims_refresh::{
    ClaimsRefresher, IdentityLookup, IdentitySnapshot, LookupError, RefreshFailureMode,
    RefreshOutcome, RefreshPolicy, SessionError,
};
pub use logging::Logging;
pub use route_class::{PathClassifier, RouteClass};
pub use session_gate::{
    login_redirect_location, AuthenticatedUser, RequestSession, SessionCookieConfig, SessionGate,
    DEFAULT_COOKIE_NAME, DEFAULT_LOGIN_PATH,
};
pub use trace_headers::{TraceContext, X_METHOD, X_PATHNAME, X_USER_ID};
