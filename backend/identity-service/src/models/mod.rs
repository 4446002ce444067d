/// Data models for identity and authentication
pub mod identity;

pub use identity::{IdentityRecord, NewIdentity, DEFAULT_ROLE};
