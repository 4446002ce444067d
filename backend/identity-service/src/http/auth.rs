//! Authentication endpoints under `/api/auth`

use crate::error::{IdentityError, Result};
use crate::http::AppState;
use crate::models::{NewIdentity, DEFAULT_ROLE};
use crate::security::hash_password;
use crate::validators::validate_email_shape_validator;
use actix_middleware::RequestSession;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_email_shape_validator"))]
    pub email: String,
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(length(min = 8))]
    pub password: String,
}

/// POST /api/auth/callback/credentials
pub async fn sign_in(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    let claims = state.verifier.verify(&body.email, &body.password).await?;
    let token = state.codec.encode(&claims, Utc::now())?;

    Ok(HttpResponse::Ok()
        .cookie(state.cookie.build(token, state.codec.max_age_secs()))
        .json(json!({
            "user": {
                "id": claims.uid,
                "email": claims.email,
                "name": claims.name,
                "roles": claims.roles,
            }
        })))
}

/// POST /api/auth/signout
pub async fn sign_out(state: web::Data<AppState>, session: RequestSession) -> HttpResponse {
    if let Some(uid) = session.user_id() {
        tracing::info!(user_id = uid, "Signed out");
    }

    HttpResponse::Ok()
        .cookie(state.cookie.removal())
        .json(json!({ "ok": true }))
}

/// GET /api/auth/session
pub async fn session(session: RequestSession) -> HttpResponse {
    match session.claims() {
        Some(claims) => HttpResponse::Ok().json(json!({
            "user": {
                "id": claims.uid,
                "email": claims.email,
                "name": claims.name,
                "roles": claims.roles,
                "token_version": claims.tv,
            }
        })),
        None => HttpResponse::Ok().json(json!({})),
    }
}

/// POST /api/auth/register
///
/// Creates the identity only; the client signs in separately.
pub async fn register(
    state: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse> {
    let req = body.into_inner();
    req.validate()?;

    if state.store.find_identity_by_email(&req.email).await?.is_some() {
        return Err(IdentityError::EmailAlreadyExists);
    }

    let password = req.password;
    let password_hash = web::block(move || hash_password(&password))
        .await
        .map_err(|e| IdentityError::Internal(format!("Password hashing task failed: {}", e)))??;

    let record = state
        .store
        .create_identity(NewIdentity {
            email: req.email,
            name: req.name,
            password_hash,
            roles: vec![DEFAULT_ROLE.to_string()],
        })
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "user": { "id": record.id, "email": record.email }
    })))
}
