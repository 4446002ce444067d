/// Service layer for identity-service
///
/// - Credential verification (email + password sign-in)
pub mod credentials;

pub use credentials::CredentialVerifier;
