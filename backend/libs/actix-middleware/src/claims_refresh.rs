//! Claims refresh and revocation
//!
//! Decides, once per decoded token per request, whether the claims cached in
//! the token can be trusted or must be re-read from the identity store.
//!
//! ## Algorithm
//!
//! 1. No session: nothing to refresh
//! 2. `elapsed = now - last_refresh`
//! 3. Interval of zero, or `elapsed <= interval`: trust the token, no store access
//! 4. Otherwise fetch the canonical identity by id:
//!    - missing, or canonical token version strictly greater: revoked
//!    - else copy email/name/roles/version and stamp `last_refresh = now`
//!
//! A revocation is only observed at the next refresh boundary, so the
//! maximum staleness window for a forced logout is exactly the interval.
//! An interval of zero disables refresh entirely: claims stay frozen at
//! issuance values until the token expires.
use async_trait::async_trait;
use crypto_core::SessionClaims;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

/// Canonical identity as seen by the refresh controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub roles: BTreeSet<String>,
    pub token_version: i64,
}

#[derive(Debug, Error)]
#[error("identity lookup failed: {0}")]
pub struct LookupError(pub String);

/// Read-only access to the system of record, by user id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn find_identity_by_id(&self, id: i64) -> Result<Option<IdentitySnapshot>, LookupError>;
}

/// Why a refresh did not produce updated claims.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session for user {uid} revoked: {reason}")]
    Revoked { uid: i64, reason: &'static str },

    #[error("identity store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("identity store did not answer within {0:?}")]
    StoreTimeout(Duration),
}

/// What to do with a session when the store cannot be reached at a refresh boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshFailureMode {
    /// Keep the last-known-good claims for this request, retry on the next one
    FailOpen,
    /// Treat the request as unauthenticated
    #[default]
    FailClosed,
}

impl FromStr for RefreshFailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!("unknown refresh failure mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Zero disables refresh
    pub interval: Duration,
    /// Upper bound on a single canonical-record fetch
    pub store_timeout: Duration,
    pub failure_mode: RefreshFailureMode,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            failure_mode: RefreshFailureMode::FailClosed,
        }
    }
}

impl RefreshPolicy {
    /// Build the interval from a signed millisecond value; negatives disable refresh.
    pub fn interval_from_millis(ms: i64) -> Duration {
        Duration::from_millis(ms.max(0) as u64)
    }

    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    fn interval_ms(&self) -> i64 {
        i64::try_from(self.interval.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Session validity for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No session was presented
    Anonymous,
    /// Cached claims are inside the refresh window
    Fresh(SessionClaims),
    /// Claims were re-read from the store
    Refreshed(SessionClaims),
    /// Identity gone or token version bumped
    Revoked,
    /// Store failed, last-known-good claims kept (fail-open)
    Degraded(SessionClaims),
    /// Store failed, session ignored for this request (fail-closed)
    Unavailable,
}

impl RefreshOutcome {
    pub fn claims(&self) -> Option<&SessionClaims> {
        match self {
            Self::Fresh(c) | Self::Refreshed(c) | Self::Degraded(c) => Some(c),
            Self::Anonymous | Self::Revoked | Self::Unavailable => None,
        }
    }

    pub fn into_claims(self) -> Option<SessionClaims> {
        match self {
            Self::Fresh(c) | Self::Refreshed(c) | Self::Degraded(c) => Some(c),
            Self::Anonymous | Self::Revoked | Self::Unavailable => None,
        }
    }

    /// Claims changed and must be written back into the token.
    pub fn reissue_token(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }

    /// The presented token is dead for good.
    pub fn clears_session(&self) -> bool {
        matches!(self, Self::Revoked)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Fresh(_) => "fresh",
            Self::Refreshed(_) => "refreshed",
            Self::Revoked => "revoked",
            Self::Degraded(_) => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Revocation check: the store has moved past the version the token was built from.
pub fn is_revoked(canonical: &IdentitySnapshot, claims: &SessionClaims) -> bool {
    canonical.token_version > claims.tv
}

/// Runs the refresh policy against an injected identity lookup.
#[derive(Clone)]
pub struct ClaimsRefresher {
    lookup: Arc<dyn IdentityLookup>,
    policy: RefreshPolicy,
}

impl ClaimsRefresher {
    pub fn new(lookup: Arc<dyn IdentityLookup>, policy: RefreshPolicy) -> Self {
        Self { lookup, policy }
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    /// Whether `claims` crossed the refresh boundary at `now_ms`.
    pub fn is_due(&self, claims: &SessionClaims, now_ms: i64) -> bool {
        self.policy.is_enabled() && claims.refresh_age_ms(now_ms) > self.policy.interval_ms()
    }

    /// Resolve the session state for one request.
    pub async fn resolve(&self, claims: Option<SessionClaims>, now_ms: i64) -> RefreshOutcome {
        let Some(claims) = claims else {
            return RefreshOutcome::Anonymous;
        };

        if !self.is_due(&claims, now_ms) {
            return RefreshOutcome::Fresh(claims);
        }

        match self.refresh(&claims, now_ms).await {
            Ok(updated) => {
                tracing::debug!(uid = updated.uid, tv = updated.tv, "Session claims refreshed");
                RefreshOutcome::Refreshed(updated)
            }
            Err(e @ SessionError::Revoked { .. }) => {
                tracing::info!(uid = claims.uid, error = %e, "Session revoked at refresh boundary");
                RefreshOutcome::Revoked
            }
            Err(e) => match self.policy.failure_mode {
                RefreshFailureMode::FailOpen => {
                    tracing::warn!(
                        uid = claims.uid,
                        error = %e,
                        "Claims refresh failed, keeping cached claims for this request"
                    );
                    RefreshOutcome::Degraded(claims)
                }
                RefreshFailureMode::FailClosed => {
                    tracing::warn!(
                        uid = claims.uid,
                        error = %e,
                        "Claims refresh failed, treating request as unauthenticated"
                    );
                    RefreshOutcome::Unavailable
                }
            },
        }
    }

    async fn refresh(
        &self,
        claims: &SessionClaims,
        now_ms: i64,
    ) -> Result<SessionClaims, SessionError> {
        let fetched = timeout(
            self.policy.store_timeout,
            self.lookup.find_identity_by_id(claims.uid),
        )
        .await
        .map_err(|_| SessionError::StoreTimeout(self.policy.store_timeout))?
        .map_err(|e| SessionError::StoreUnavailable(e.to_string()))?;

        let canonical = fetched.ok_or(SessionError::Revoked {
            uid: claims.uid,
            reason: "identity no longer exists",
        })?;

        if is_revoked(&canonical, claims) {
            return Err(SessionError::Revoked {
                uid: claims.uid,
                reason: "token version bumped",
            });
        }

        Ok(SessionClaims {
            uid: claims.uid,
            email: canonical.email,
            name: canonical.name,
            roles: canonical.roles,
            tv: canonical.token_version,
            last_refresh: now_ms,
        })
    }
}
