/// Security module for authentication
///
/// - **password**: Argon2id password hashing
///
/// Session tokens are signed and verified by `crypto_core::jwt`.
pub mod password;

pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
