use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

/// Input validation utilities for identity service

// Compile regex patterns once at startup
static EMAIL_REGEX: Lazy<Option<Regex>> = Lazy::new(|| {
    match Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$") {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(error = %e, "Email regex failed to compile");
            None
        }
    }
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty()
        && email.len() <= 254
        && EMAIL_REGEX.as_ref().is_some_and(|re| re.is_match(email))
}

/// validator crate compatible custom validator for email shape
pub fn validate_email_shape_validator(email: &str) -> Result<(), ValidationError> {
    if validate_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email"))
    }
}
