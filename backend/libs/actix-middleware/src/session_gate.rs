//! Session gate middleware
//!
//! Runs once per request, before any handler:
//! 1. classify the path (public / static / protected)
//! 2. decode the session token if one was presented (cookie, then bearer)
//! 3. run the claims refresh policy on the decoded claims
//! 4. protected path without a session: 302 to the login page with `next`
//! 5. otherwise stamp trace headers, store the resolved session in the
//!    request extensions and call the handler
//! 6. write the token back when claims were refreshed or the token is due for
//!    renewal, and drop the cookie when the session was revoked
//!
//! Decode failures, revocations and store failures never escape as errors:
//! the only visible failure is the login redirect.
//!
//! ## Example
//! ```rust,ignore
//! use actix_middleware::{ClaimsRefresher, SessionGate};
//!
//! let app = App::new()
//!     .wrap(SessionGate::new(codec.clone(), refresher.clone()))
//!     .wrap(Logging);
//! ```

use crate::claims_refresh::{ClaimsRefresher, RefreshOutcome};
use crate::route_class::PathClassifier;
use crate::trace_headers::TraceContext;
use actix_web::{
    body::EitherBody,
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, FromRequest, HttpMessage, HttpRequest, HttpResponse,
};
use chrono::Utc;
use crypto_core::{SessionClaims, SessionTokenCodec};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::Instrument;

pub const DEFAULT_COOKIE_NAME: &str = "session-token";
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Session cookie attributes
#[derive(Debug, Clone)]
pub struct SessionCookieConfig {
    pub name: String,
    pub secure: bool,
}

impl Default for SessionCookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            secure: false,
        }
    }
}

impl SessionCookieConfig {
    /// Cookie carrying `token` for `max_age_secs`.
    pub fn build(&self, token: String, max_age_secs: i64) -> Cookie<'static> {
        Cookie::build(self.name.clone(), token)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(CookieDuration::seconds(max_age_secs))
            .finish()
    }

    /// Cookie instructing the client to forget the session.
    pub fn removal(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(self.name.clone(), "")
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .finish();
        cookie.make_removal();
        cookie
    }
}

/// Login URL preserving the original destination (path and query).
pub fn login_redirect_location(login_path: &str, path: &str, query: &str) -> String {
    let target = if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    };
    format!("{login_path}?next={}", urlencoding::encode(&target))
}

// ============================================================================
// Request-scoped session
// ============================================================================

/// The session resolved for the current request.
///
/// Computed exactly once by [`SessionGate`] and shared by every extractor in
/// the same request. Without the gate it is always anonymous.
#[derive(Debug, Clone, Default)]
pub struct RequestSession {
    claims: Option<Arc<SessionClaims>>,
}

impl RequestSession {
    pub fn new(claims: Option<SessionClaims>) -> Self {
        Self {
            claims: claims.map(Arc::new),
        }
    }

    pub fn claims(&self) -> Option<&SessionClaims> {
        self.claims.as_deref()
    }

    pub fn user_id(&self) -> Option<i64> {
        self.claims.as_ref().map(|c| c.uid)
    }

    pub fn is_authenticated(&self) -> bool {
        self.claims.is_some()
    }
}

impl FromRequest for RequestSession {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(req
            .extensions()
            .get::<RequestSession>()
            .cloned()
            .unwrap_or_default()))
    }
}

/// Claims of an authenticated caller; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Arc<SessionClaims>);

impl FromRequest for AuthenticatedUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req
            .extensions()
            .get::<RequestSession>()
            .and_then(|s| s.claims.clone())
        {
            Some(claims) => ready(Ok(AuthenticatedUser(claims))),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "User not authenticated",
            ))),
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

struct GateState {
    codec: Arc<SessionTokenCodec>,
    refresher: ClaimsRefresher,
    classifier: PathClassifier,
    cookie: SessionCookieConfig,
    login_path: String,
}

/// Session gate middleware
#[derive(Clone)]
pub struct SessionGate {
    state: Rc<GateState>,
}

impl SessionGate {
    pub fn new(codec: Arc<SessionTokenCodec>, refresher: ClaimsRefresher) -> Self {
        Self {
            state: Rc::new(GateState {
                codec,
                refresher,
                classifier: PathClassifier::default(),
                cookie: SessionCookieConfig::default(),
                login_path: DEFAULT_LOGIN_PATH.to_string(),
            }),
        }
    }

    pub fn with_classifier(self, classifier: PathClassifier) -> Self {
        self.map_state(|s| s.classifier = classifier)
    }

    pub fn with_cookie(self, cookie: SessionCookieConfig) -> Self {
        self.map_state(|s| s.cookie = cookie)
    }

    pub fn with_login_path(self, login_path: impl Into<String>) -> Self {
        let login_path = login_path.into();
        self.map_state(|s| s.login_path = login_path)
    }

    fn map_state(self, f: impl FnOnce(&mut GateState)) -> Self {
        let mut state = match Rc::try_unwrap(self.state) {
            Ok(state) => state,
            Err(shared) => GateState {
                codec: shared.codec.clone(),
                refresher: shared.refresher.clone(),
                classifier: shared.classifier.clone(),
                cookie: shared.cookie.clone(),
                login_path: shared.login_path.clone(),
            },
        };
        f(&mut state);
        Self {
            state: Rc::new(state),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SessionGateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionGateService {
            service: Rc::new(service),
            state: self.state.clone(),
        }))
    }
}

pub struct SessionGateService<S> {
    service: Rc<S>,
    state: Rc<GateState>,
}

impl<S, B> Service<ServiceRequest> for SessionGateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let state = self.state.clone();

        Box::pin(async move {
            let route = state.classifier.classify(req.path());
            let now = Utc::now();

            // Always decode, even on public routes, so identity is available downstream
            let decoded = extract_token(&req, &state.cookie.name).and_then(|token| {
                match state.codec.decode(&token) {
                    Ok(decoded) => Some(decoded),
                    Err(e) => {
                        tracing::debug!(path = %req.path(), error = %e, "Ignoring undecodable session token");
                        None
                    }
                }
            });
            let renewal_due = decoded
                .as_ref()
                .is_some_and(|d| state.codec.needs_renewal(d, now));

            let outcome = state
                .refresher
                .resolve(decoded.map(|d| d.claims), now.timestamp_millis())
                .await;
            let clears_session = outcome.clears_session();
            let reissue = outcome.reissue_token()
                || (renewal_due && matches!(outcome, RefreshOutcome::Fresh(_)));
            let session_state = outcome.label();
            let claims = outcome.into_claims();

            if route.requires_session() && claims.is_none() {
                let location =
                    login_redirect_location(&state.login_path, req.path(), req.query_string());
                tracing::info!(
                    path = %req.path(),
                    session = session_state,
                    "Redirecting unauthenticated request to login"
                );

                let mut redirect = HttpResponse::Found();
                redirect.insert_header((header::LOCATION, location));
                if clears_session {
                    redirect.cookie(state.cookie.removal());
                }
                return Ok(req.into_response(redirect.finish()).map_into_right_body());
            }

            let trace = TraceContext::new(
                req.method().as_str(),
                req.path(),
                claims.as_ref().map(|c| c.uid),
            );
            trace.apply(req.headers_mut());

            let reissued = match (&claims, reissue) {
                (Some(c), true) => match state.codec.encode(c, now) {
                    Ok(token) => Some(token),
                    Err(e) => {
                        tracing::warn!(uid = c.uid, error = %e, "Failed to reissue session token");
                        None
                    }
                },
                _ => None,
            };

            req.extensions_mut().insert(RequestSession::new(claims));
            req.extensions_mut().insert(trace.clone());

            tracing::debug!(route = route.as_str(), session = session_state, "Session resolved");

            let mut res = service.call(req).instrument(trace.span()).await?;

            // A handler that set or removed the session cookie itself wins
            let handler_owns_cookie = res
                .response()
                .cookies()
                .any(|c| c.name() == state.cookie.name);
            if !handler_owns_cookie {
                let cookie = match reissued {
                    Some(token) => Some(state.cookie.build(token, state.codec.max_age_secs())),
                    None if clears_session => Some(state.cookie.removal()),
                    None => None,
                };
                if let Some(cookie) = cookie {
                    if let Err(e) = res.response_mut().add_cookie(&cookie) {
                        tracing::warn!(error = %e, "Failed to attach session cookie");
                    }
                }
            }

            Ok(res.map_into_left_body())
        })
    }
}

/// Session cookie first, then `Authorization: Bearer`.
fn extract_token(req: &ServiceRequest, cookie_name: &str) -> Option<String> {
    if let Some(cookie) = req.cookie(cookie_name) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
