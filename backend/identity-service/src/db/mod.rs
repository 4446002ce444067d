/// Database operations for identity service
pub mod identities;
pub mod query_log;

pub use identities::{IdentityStore, PgIdentityStore};
pub use query_log::QueryLog;
