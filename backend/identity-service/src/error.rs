use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already in use")]
    EmailAlreadyExists,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Message safe to return to the client
    fn public_message(&self) -> String {
        match self {
            IdentityError::InvalidCredentials => "Invalid credentials".to_string(),
            IdentityError::EmailAlreadyExists => "Email already in use".to_string(),
            IdentityError::Validation(msg) => msg.clone(),
            // Don't leak internal details
            IdentityError::Database(_) | IdentityError::Token(_) | IdentityError::Internal(_) => {
                "Internal Server Error".to_string()
            }
        }
    }
}

impl ResponseError for IdentityError {
    fn status_code(&self) -> StatusCode {
        match self {
            IdentityError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            IdentityError::EmailAlreadyExists => StatusCode::CONFLICT,
            IdentityError::Validation(_) => StatusCode::BAD_REQUEST,
            IdentityError::Database(_) | IdentityError::Token(_) | IdentityError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}

// Conversions from external error types
impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<crypto_core::CodecError> for IdentityError {
    fn from(err: crypto_core::CodecError) -> Self {
        tracing::error!("Session token error: {}", err);
        IdentityError::Token(err.to_string())
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(err.to_string())
    }
}

impl From<actix_middleware::LookupError> for IdentityError {
    fn from(err: actix_middleware::LookupError) -> Self {
        IdentityError::Database(err.0)
    }
}
