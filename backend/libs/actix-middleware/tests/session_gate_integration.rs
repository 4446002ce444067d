use actix_middleware::{
    ClaimsRefresher, IdentityLookup, IdentitySnapshot, LookupError, PathClassifier,
    RefreshFailureMode, RefreshPolicy, RequestSession, SessionGate, X_USER_ID,
};
use actix_web::cookie::Cookie;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App, HttpRequest, HttpResponse};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use crypto_core::{SessionClaims, SessionTokenCodec};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SECRET: &[u8] = b"integration-secret-0123456789abcdef";
const COOKIE: &str = "session-token";

/// In-memory identity store that counts lookups
#[derive(Default)]
struct TestStore {
    identities: Mutex<HashMap<i64, IdentitySnapshot>>,
    lookups: AtomicUsize,
    fail: bool,
}

impl TestStore {
    fn with_identity(identity: IdentitySnapshot) -> Self {
        let store = Self::default();
        store
            .identities
            .lock()
            .unwrap()
            .insert(identity.id, identity);
        store
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityLookup for TestStore {
    async fn find_identity_by_id(&self, id: i64) -> Result<Option<IdentitySnapshot>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LookupError("connection refused".to_string()));
        }
        Ok(self.identities.lock().unwrap().get(&id).cloned())
    }
}

fn identity(token_version: i64, email: &str) -> IdentitySnapshot {
    IdentitySnapshot {
        id: 7,
        email: email.to_string(),
        name: Some("Ada".to_string()),
        roles: BTreeSet::from(["USER".to_string()]),
        token_version,
    }
}

fn codec() -> Arc<SessionTokenCodec> {
    Arc::new(SessionTokenCodec::with_default_lifetimes(SECRET).unwrap())
}

fn policy(interval_ms: i64) -> RefreshPolicy {
    RefreshPolicy {
        interval: RefreshPolicy::interval_from_millis(interval_ms),
        store_timeout: Duration::from_millis(200),
        failure_mode: RefreshFailureMode::FailClosed,
    }
}

/// Token for user 7 at version 0, claims last refreshed `refreshed_ago` ago.
fn token(codec: &SessionTokenCodec, refreshed_ago: ChronoDuration) -> String {
    let now = Utc::now();
    let claims = SessionClaims::issue(
        7,
        "ada@example.com",
        Some("Ada".to_string()),
        ["USER".to_string()],
        0,
        (now - refreshed_ago).timestamp_millis(),
    );
    codec.encode(&claims, now).unwrap()
}

async fn whoami(session: RequestSession, req: HttpRequest) -> HttpResponse {
    let header_uid = req
        .headers()
        .get(X_USER_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    HttpResponse::Ok().json(json!({
        "uid": session.user_id(),
        "email": session.claims().map(|c| c.email.clone()),
        "x_user_id": header_uid,
        "x_pathname": req.headers().get("x-pathname").and_then(|v| v.to_str().ok()),
    }))
}

macro_rules! gated_app {
    ($codec:expr, $store:expr, $interval_ms:expr) => {
        test::init_service(
            App::new()
                .wrap(SessionGate::new(
                    $codec.clone(),
                    ClaimsRefresher::new($store.clone(), policy($interval_ms)),
                ))
                .route("/projects", web::get().to(whoami))
                .route("/api/auth/session", web::get().to(whoami))
                .route("/images/logo.png", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await
    };
}

fn session_cookie<B>(resp: &actix_web::dev::ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == COOKIE)
        .map(|c| c.into_owned())
}

#[actix_web::test]
async fn test_unauthenticated_protected_request_redirects_to_login() {
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec(), store, 0);

    let req = test::TestRequest::get().uri("/projects").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/login?next=%2Fprojects"
    );
}

#[actix_web::test]
async fn test_redirect_preserves_query_string() {
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec(), store, 0);

    let req = test::TestRequest::get()
        .uri("/projects?tab=open")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/login?next=%2Fprojects%3Ftab%3Dopen"
    );
}

#[actix_web::test]
async fn test_public_and_static_paths_pass_without_session() {
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec(), store, 0);

    let req = test::TestRequest::get().uri("/api/auth/session").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/images/logo.png").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_authenticated_request_carries_trace_headers() {
    let codec = codec();
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec, store, 0);

    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, token(&codec, ChronoDuration::zero())))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["uid"], 7);
    assert_eq!(body["x_user_id"], "7");
    assert_eq!(body["x_pathname"], "/projects");
    assert_eq!(store.lookups(), 0);
}

#[actix_web::test]
async fn test_bearer_token_accepted_when_no_cookie() {
    let codec = codec();
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec, store, 0);

    let req = test::TestRequest::get()
        .uri("/projects")
        .insert_header((
            header::AUTHORIZATION,
            format!("Bearer {}", token(&codec, ChronoDuration::zero())),
        ))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_spoofed_user_id_header_is_stripped() {
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec(), store, 0);

    let req = test::TestRequest::get()
        .uri("/api/auth/session")
        .insert_header((X_USER_ID, "1"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["uid"].is_null());
    assert!(body["x_user_id"].is_null());
}

#[actix_web::test]
async fn test_garbage_token_is_treated_as_anonymous() {
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec(), store, 0);

    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, "garbage"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
}

#[actix_web::test]
async fn test_no_store_access_inside_refresh_interval() {
    let codec = codec();
    let store = Arc::new(TestStore::with_identity(identity(5, "ada@example.com")));
    let app = gated_app!(codec, store, 60_000);

    for _ in 0..3 {
        let req = test::TestRequest::get()
            .uri("/projects")
            .cookie(Cookie::new(COOKIE, token(&codec, ChronoDuration::seconds(10))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // Version was bumped in the store, but nothing is observed before the boundary
    assert_eq!(store.lookups(), 0);
}

#[actix_web::test]
async fn test_revoked_session_redirects_and_clears_cookie() {
    let codec = codec();
    let store = Arc::new(TestStore::with_identity(identity(1, "ada@example.com")));
    let app = gated_app!(codec, store, 1_000);
    let stale = token(&codec, ChronoDuration::seconds(5));

    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, stale.clone()))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    let cookie = session_cookie(&resp).expect("removal cookie");
    assert_eq!(cookie.value(), "");
    assert_eq!(
        cookie.max_age(),
        Some(actix_web::cookie::time::Duration::ZERO)
    );

    // Replaying the same token keeps failing
    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, stale))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(store.lookups(), 2);
}

#[actix_web::test]
async fn test_refresh_reissues_token_with_store_claims() {
    let codec = codec();
    let store = Arc::new(TestStore::with_identity(identity(0, "ada@new.example.com")));
    let app = gated_app!(codec, store, 1_000);

    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, token(&codec, ChronoDuration::seconds(5))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = session_cookie(&resp).expect("reissued cookie");
    let decoded = codec.decode(cookie.value()).unwrap();
    assert_eq!(decoded.claims.email, "ada@new.example.com");
    assert!(decoded.claims.refresh_age_ms(Utc::now().timestamp_millis()) < 5_000);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["email"], "ada@new.example.com");
    assert_eq!(store.lookups(), 1);
}

#[actix_web::test]
async fn test_store_failure_fails_closed() {
    let codec = codec();
    let store = Arc::new(TestStore::failing());
    let app = gated_app!(codec, store, 1_000);

    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, token(&codec, ChronoDuration::seconds(5))))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::FOUND);
    // The cookie survives a transient outage
    assert!(session_cookie(&resp).is_none());
}

#[actix_web::test]
async fn test_token_past_update_age_is_renewed() {
    let codec = codec();
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec, store, 0);

    let claims = SessionClaims::issue(
        7,
        "ada@example.com",
        None,
        ["USER".to_string()],
        0,
        Utc::now().timestamp_millis(),
    );
    let old = codec
        .encode(&claims, Utc::now() - ChronoDuration::hours(25))
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/projects")
        .cookie(Cookie::new(COOKIE, old))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = session_cookie(&resp).expect("renewed cookie");
    let renewed = codec.decode(cookie.value()).unwrap();
    assert_eq!(renewed.claims, claims);
    assert!(renewed.issued_at > Utc::now() - ChronoDuration::minutes(1));
}

#[actix_web::test]
async fn test_revoked_session_on_public_and_static_paths_passes_and_clears_cookie() {
    let codec = codec();
    let store = Arc::new(TestStore::with_identity(identity(1, "ada@example.com")));
    let app = gated_app!(codec, store, 1_000);

    for path in ["/api/auth/session", "/images/logo.png"] {
        let req = test::TestRequest::get()
            .uri(path)
            .cookie(Cookie::new(COOKIE, token(&codec, ChronoDuration::seconds(5))))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK, "{path}");
        let cookie = session_cookie(&resp).expect("removal cookie");
        assert_eq!(cookie.value(), "");
        assert_eq!(
            cookie.max_age(),
            Some(actix_web::cookie::time::Duration::ZERO)
        );
    }

    let req = test::TestRequest::get()
        .uri("/api/auth/session")
        .cookie(Cookie::new(COOKIE, token(&codec, ChronoDuration::seconds(5))))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["uid"].is_null());
}

#[actix_web::test]
async fn test_garbage_token_on_public_path_is_not_blocked() {
    let store = Arc::new(TestStore::default());
    let app = gated_app!(codec(), store, 0);

    for path in ["/api/auth/session", "/images/logo.png"] {
        let req = test::TestRequest::get()
            .uri(path)
            .cookie(Cookie::new(COOKIE, "garbage"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{path}");
    }
    assert_eq!(store.lookups(), 0);
}

#[actix_web::test]
async fn test_custom_classifier_and_login_path() {
    let codec = codec();
    let store = Arc::new(TestStore::default());
    let gate = SessionGate::new(
        codec.clone(),
        ClaimsRefresher::new(store.clone(), policy(0)),
    );
    // The builders must not leak into an existing clone
    let default_gate = gate.clone();
    let custom_gate = gate
        .with_classifier(PathClassifier::new(["/signin", "/docs"], ["/assets"]))
        .with_login_path("/signin");

    let app = test::init_service(
        App::new()
            .wrap(custom_gate)
            .route("/docs/intro", web::get().to(whoami))
            .route("/projects", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get().uri("/docs/intro").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

    let req = test::TestRequest::get().uri("/projects?tab=open").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/signin?next=%2Fprojects%3Ftab%3Dopen"
    );

    let app = test::init_service(
        App::new()
            .wrap(default_gate)
            .route("/docs/intro", web::get().to(whoami)),
    )
    .await;

    let req = test::TestRequest::get().uri("/docs/intro").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).unwrap(),
        "/login?next=%2Fdocs%2Fintro"
    );
}
