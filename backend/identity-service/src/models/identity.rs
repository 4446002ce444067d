use actix_middleware::IdentitySnapshot;
use sqlx::FromRow;

/// Role granted to every self-registered identity
pub const DEFAULT_ROLE: &str = "USER";

/// Canonical identity row with its aggregated role slugs
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IdentityRecord {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub token_version: i64,
    pub roles: Vec<String>,
}

impl IdentityRecord {
    /// The fields the session layer is allowed to see (no password hash).
    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            roles: self.roles.iter().cloned().collect(),
            token_version: self.token_version,
        }
    }
}

impl From<IdentityRecord> for IdentitySnapshot {
    fn from(record: IdentityRecord) -> Self {
        IdentitySnapshot {
            id: record.id,
            email: record.email,
            name: record.name,
            roles: record.roles.into_iter().collect(),
            token_version: record.token_version,
        }
    }
}

/// Input for creating an identity; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub roles: Vec<String>,
}
