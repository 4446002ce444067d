/// Identity database operations for identity-service
use crate::db::QueryLog;
use crate::error::{IdentityError, Result};
use crate::models::{IdentityRecord, NewIdentity};
use actix_middleware::{IdentityLookup, IdentitySnapshot, LookupError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const SELECT_BY_EMAIL: &str = r#"
    SELECT u.id, u.email, u.name, u.password_hash,
           u.token_version::BIGINT AS token_version,
           COALESCE(array_agg(DISTINCT r.slug::TEXT) FILTER (WHERE r.slug IS NOT NULL), '{}'::TEXT[]) AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
    WHERE u.email = $1
    GROUP BY u.id
"#;

const SELECT_BY_ID: &str = r#"
    SELECT u.id, u.email, u.name, u.password_hash,
           u.token_version::BIGINT AS token_version,
           COALESCE(array_agg(DISTINCT r.slug::TEXT) FILTER (WHERE r.slug IS NOT NULL), '{}'::TEXT[]) AS roles
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
    WHERE u.id = $1
    GROUP BY u.id
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users (email, name, password_hash)
    VALUES ($1, $2, $3)
    RETURNING id
"#;

const ASSIGN_ROLES: &str = r#"
    INSERT INTO user_roles (user_id, role_id)
    SELECT $1, r.id FROM roles r WHERE r.slug = ANY($2)
    ON CONFLICT DO NOTHING
"#;

const SELECT_NOW: &str = "SELECT NOW()";

/// Full identity store used by the service: the session layer's by-id lookup
/// plus the by-email, create and liveness operations.
#[async_trait]
pub trait IdentityStore: IdentityLookup {
    /// Identity with its password hash, for credential checks
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<IdentityRecord>>;

    /// Insert a new identity and grant it `new.roles`. Duplicate email fails
    /// with [`IdentityError::EmailAlreadyExists`].
    async fn create_identity(&self, new: NewIdentity) -> Result<IdentityRecord>;

    /// Trivial round-trip returning the database clock
    async fn ping(&self) -> Result<DateTime<Utc>>;
}

/// PostgreSQL-backed identity store
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
    log: QueryLog,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool, log: QueryLog) -> Self {
        Self { pool, log }
    }

    async fn fetch_by_id(&self, id: i64) -> std::result::Result<Option<IdentityRecord>, sqlx::Error> {
        self.log
            .run(
                SELECT_BY_ID,
                &[&id],
                sqlx::query_as::<_, IdentityRecord>(SELECT_BY_ID)
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await
    }
}

#[async_trait]
impl IdentityLookup for PgIdentityStore {
    async fn find_identity_by_id(
        &self,
        id: i64,
    ) -> std::result::Result<Option<IdentitySnapshot>, LookupError> {
        self.fetch_by_id(id)
            .await
            .map(|record| record.map(IdentitySnapshot::from))
            .map_err(|e| LookupError(e.to_string()))
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<IdentityRecord>> {
        let record = self
            .log
            .run(
                SELECT_BY_EMAIL,
                &[&email],
                sqlx::query_as::<_, IdentityRecord>(SELECT_BY_EMAIL)
                    .bind(email)
                    .fetch_optional(&self.pool),
            )
            .await?;

        Ok(record)
    }

    async fn create_identity(&self, new: NewIdentity) -> Result<IdentityRecord> {
        let mut tx = self.pool.begin().await?;

        let inserted = self
            .log
            .run(
                INSERT_USER,
                &[&new.email, &new.name.as_deref().unwrap_or("NULL")],
                sqlx::query_scalar::<_, i64>(INSERT_USER)
                    .bind(&new.email)
                    .bind(&new.name)
                    .bind(&new.password_hash)
                    .fetch_one(&mut *tx),
            )
            .await;

        let id = match inserted {
            Ok(id) => id,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(IdentityError::EmailAlreadyExists);
            }
            Err(e) => return Err(e.into()),
        };

        if !new.roles.is_empty() {
            let roles = new.roles.join(",");
            self.log
                .run(
                    ASSIGN_ROLES,
                    &[&id, &roles],
                    sqlx::query(ASSIGN_ROLES)
                        .bind(id)
                        .bind(&new.roles)
                        .execute(&mut *tx),
                )
                .await?;
        }

        tx.commit().await?;

        tracing::info!(user_id = id, "Identity created");

        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| IdentityError::Internal(format!("identity {} vanished after insert", id)))
    }

    async fn ping(&self) -> Result<DateTime<Utc>> {
        let now = self
            .log
            .run(
                SELECT_NOW,
                &[],
                sqlx::query_scalar::<_, DateTime<Utc>>(SELECT_NOW).fetch_one(&self.pool),
            )
            .await?;

        Ok(now)
    }
}
