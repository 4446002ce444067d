//! Credential verification
//!
//! The only way a session is created. Looks the identity up by email, checks
//! the password against the stored Argon2 hash, and seeds a claims bundle
//! from the canonical record. Never writes to the store.

use crate::db::IdentityStore;
use crate::error::{IdentityError, Result};
use crate::security::verify_password;
use chrono::Utc;
use crypto_core::SessionClaims;
use std::sync::Arc;

/// Argon2id hash (default parameters) checked when the email is unknown or the
/// stored hash is unusable, so every failure path costs one Argon2 run.
pub(crate) const DUMMY_PASSWORD_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$pO55wkm0kvMeHAl7CWwJfg$AiwBr+567JoxVgIdwdf/f43gt24cqDi8TTr242uvm0E";

#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn IdentityStore>,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Verify `email` / `password` and return the initial claims.
    ///
    /// Unknown email and wrong password both yield
    /// [`IdentityError::InvalidCredentials`].
    pub async fn verify(&self, email: &str, password: &str) -> Result<SessionClaims> {
        if email.is_empty() || password.is_empty() {
            return Err(IdentityError::InvalidCredentials);
        }

        let record = self.store.find_identity_by_email(email).await?;

        let Some(record) = record else {
            let _ = check_password(password.to_string(), DUMMY_PASSWORD_HASH.to_string()).await;
            tracing::debug!("Sign-in attempt for unknown email");
            return Err(IdentityError::InvalidCredentials);
        };

        let matches = match check_password(password.to_string(), record.password_hash.clone()).await
        {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!(user_id = record.id, error = %e, "Stored password hash is unusable");
                let _ = check_password(password.to_string(), DUMMY_PASSWORD_HASH.to_string()).await;
                false
            }
        };
        if !matches {
            tracing::info!(user_id = record.id, "Sign-in rejected: password mismatch");
            return Err(IdentityError::InvalidCredentials);
        }

        tracing::info!(user_id = record.id, "Credentials verified");

        Ok(SessionClaims::issue(
            record.id,
            record.email,
            record.name,
            record.roles,
            record.token_version,
            Utc::now().timestamp_millis(),
        ))
    }
}

/// Argon2 off the async executor.
async fn check_password(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| IdentityError::Internal(format!("Password verification task failed: {}", e)))?
}
