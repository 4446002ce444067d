//! Shared fixtures for identity-service integration tests

use actix_middleware::{IdentityLookup, IdentitySnapshot, LookupError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service::db::IdentityStore;
use identity_service::models::{IdentityRecord, NewIdentity};
use identity_service::{IdentityError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const SECRET: &[u8] = b"identity-flow-secret-0123456789abcdef";

/// In-memory identity store
#[derive(Default)]
pub struct MemoryStore {
    identities: Mutex<HashMap<i64, IdentityRecord>>,
    down: AtomicBool,
}

impl MemoryStore {
    /// Simulate a database outage for every subsequent call.
    pub fn take_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    /// Forced logout: invalidate every token issued for `id` so far.
    pub fn bump_token_version(&self, id: i64) {
        if let Some(record) = self.identities.lock().unwrap().get_mut(&id) {
            record.token_version += 1;
        }
    }

    pub fn rename(&self, id: i64, name: &str) {
        if let Some(record) = self.identities.lock().unwrap().get_mut(&id) {
            record.name = Some(name.to_string());
        }
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(IdentityError::Database("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityLookup for MemoryStore {
    async fn find_identity_by_id(
        &self,
        id: i64,
    ) -> std::result::Result<Option<IdentitySnapshot>, LookupError> {
        self.check_up().map_err(|e| LookupError(e.to_string()))?;
        Ok(self
            .identities
            .lock()
            .unwrap()
            .get(&id)
            .map(IdentityRecord::snapshot))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<IdentityRecord>> {
        self.check_up()?;
        Ok(self
            .identities
            .lock()
            .unwrap()
            .values()
            .find(|r| r.email == email)
            .cloned())
    }

    async fn create_identity(&self, new: NewIdentity) -> Result<IdentityRecord> {
        self.check_up()?;
        let mut identities = self.identities.lock().unwrap();
        if identities.values().any(|r| r.email == new.email) {
            return Err(IdentityError::EmailAlreadyExists);
        }

        let record = IdentityRecord {
            id: identities.len() as i64 + 1,
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            token_version: 0,
            roles: new.roles,
        };
        identities.insert(record.id, record.clone());
        Ok(record)
    }

    async fn ping(&self) -> Result<DateTime<Utc>> {
        self.check_up()?;
        Ok(Utc::now())
    }
}
