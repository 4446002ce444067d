//! HTTP API
//!
//! Every route is served behind [`actix_middleware::SessionGate`]; handlers
//! read the already-resolved session through the request extractors.
mod auth;
mod health;
mod me;

use crate::db::IdentityStore;
use crate::services::CredentialVerifier;
use actix_middleware::SessionCookieConfig;
use actix_web::web;
use crypto_core::SessionTokenCodec;
use std::sync::Arc;

pub use auth::{LoginRequest, RegisterRequest};

/// Shared HTTP server state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub verifier: CredentialVerifier,
    pub codec: Arc<SessionTokenCodec>,
    pub cookie: SessionCookieConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        codec: Arc<SessionTokenCodec>,
        cookie: SessionCookieConfig,
    ) -> Self {
        Self {
            verifier: CredentialVerifier::new(store.clone()),
            store,
            codec,
            cookie,
        }
    }
}

/// Register all routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check))
            .route("/me", web::get().to(me::current_user))
            .service(
                web::scope("/auth")
                    .route("/callback/credentials", web::post().to(auth::sign_in))
                    .route("/signout", web::post().to(auth::sign_out))
                    .route("/session", web::get().to(auth::session))
                    .route("/register", web::post().to(auth::register)),
            ),
    );
}
