/// Identity Service Library
///
/// Credential sign-in, registration and session endpoints for IssueHub,
/// served behind the shared session gate.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Identity store (PostgreSQL) and query logging
/// - `error`: Error types
/// - `http`: HTTP handlers and route table
/// - `models`: Data models
/// - `security`: Password hashing
/// - `services`: Credential verification
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

use actix_middleware::{ClaimsRefresher, IdentityLookup, SessionGate};
use config::SessionSettings;
use crypto_core::SessionTokenCodec;
use std::sync::Arc;

// Re-export commonly used types
pub use error::{IdentityError, Result};

/// Session gate configured from `settings`, refreshing claims through `lookup`.
pub fn session_gate(
    settings: &SessionSettings,
    codec: Arc<SessionTokenCodec>,
    lookup: Arc<dyn IdentityLookup>,
) -> SessionGate {
    SessionGate::new(codec, ClaimsRefresher::new(lookup, settings.refresh_policy()))
        .with_cookie(settings.cookie())
}
