//! Request trace metadata
//!
//! Stamps `x-method`, `x-pathname` and (for authenticated requests only)
//! `x-user-id` onto the request before it reaches handlers, and records the
//! same fields on a tracing span wrapping the handler so every log line
//! emitted while serving the request carries them.
//!
//! The headers are observability metadata only. Anything a client sent under
//! these names is dropped first so it can never be mistaken for identity.

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

pub const X_METHOD: &str = "x-method";
pub const X_PATHNAME: &str = "x-pathname";
pub const X_USER_ID: &str = "x-user-id";

/// Method, path and user id of the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub method: String,
    pub pathname: String,
    pub user_id: Option<i64>,
}

impl TraceContext {
    pub fn new(method: impl Into<String>, pathname: impl Into<String>, user_id: Option<i64>) -> Self {
        Self {
            method: method.into(),
            pathname: pathname.into(),
            user_id,
        }
    }

    /// Replace any trace headers in `headers` with this context.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for name in [X_METHOD, X_PATHNAME, X_USER_ID] {
            headers.remove(name);
        }

        insert(headers, X_METHOD, &self.method);
        insert(headers, X_PATHNAME, &self.pathname);
        if let Some(uid) = self.user_id {
            insert(headers, X_USER_ID, &uid.to_string());
        }
    }

    pub fn span(&self) -> tracing::Span {
        let span = tracing::info_span!(
            "request",
            method = %self.method,
            path = %self.pathname,
            user_id = tracing::field::Empty,
        );
        if let Some(uid) = self.user_id {
            span.record("user_id", uid);
        }
        span
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => {
            tracing::debug!(header = name, "Skipping trace header with non-visible characters");
        }
    }
}

/// Trace context of the current request.
///
/// Set by the session gate; falls back to method/path without a user when the
/// gate is not installed.
impl FromRequest for TraceContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let ctx = req
            .extensions()
            .get::<TraceContext>()
            .cloned()
            .unwrap_or_else(|| TraceContext::new(req.method().as_str(), req.path(), None));
        ready(Ok(ctx))
    }
}
