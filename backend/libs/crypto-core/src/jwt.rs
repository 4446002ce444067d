//! Session token codec for IssueHub services
//!
//! Encodes an identity claims bundle into a signed, time-bounded JWT and
//! decodes/verifies it on every request. This is the only place that knows the
//! token wire format; everything above it works with [`SessionClaims`].
//!
//! ## Wire format
//!
//! ```json
//! { "uid": 42, "email": "a@b.c", "name": null, "roles": ["USER"],
//!   "tv": 0, "lastRefresh": 1730000000000, "iat": 1730000000, "exp": 1730604800 }
//! ```
//!
//! ## Lifetimes
//!
//! - **max_age**: each issuance expires `max_age` after its `iat`
//! - **update_age**: once a decoded token is older than this, the caller
//!   reissues the same claims with a fresh `iat`/`exp` (sliding renewal)
//!
//! ## Security Design
//!
//! - **HS256 ONLY**: the validator refuses any other `alg`
//! - **No leeway**: an expired token is rejected the second it expires
//! - **Fixed-shape claims**: the payload must deserialize into [`SessionClaims`]
//!   and carry a positive `uid`, anything else is a [`DecodeFailure`]
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// 7 days
pub const DEFAULT_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 7;
/// 24 hours
pub const DEFAULT_UPDATE_AGE_SECS: u64 = 60 * 60 * 24;
/// Minimum accepted length of the signing secret in bytes
pub const MIN_SECRET_LEN: usize = 32;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Errors
// ============================================================================

/// Reasons a presented token is not a valid session.
///
/// Callers treat every variant exactly like "no session"; the distinction only
/// exists for logging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("token is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token claims are invalid: {0}")]
    InvalidClaims(String),
}

impl From<jsonwebtoken::errors::Error> for DecodeFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => DecodeFailure::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                DecodeFailure::BadSignature
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                DecodeFailure::InvalidClaims(format!("missing {claim}"))
            }
            ErrorKind::Json(e) => DecodeFailure::InvalidClaims(e.to_string()),
            _ => DecodeFailure::Malformed,
        }
    }
}

/// Errors raised while building the codec or issuing a token.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("session secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),

    #[error("invalid session lifetime: {0}")]
    InvalidLifetime(String),

    #[error("refusing to issue token: {0}")]
    InvalidClaims(String),

    #[error("failed to encode session token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Identity claims bundle carried inside the session token.
///
/// `roles` is a set: ordering on the wire is irrelevant and duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub uid: i64,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Token version seen at the last issuance or refresh
    #[serde(default)]
    pub tv: i64,
    /// Last claims refresh, epoch milliseconds
    #[serde(rename = "lastRefresh")]
    pub last_refresh: i64,
}

impl SessionClaims {
    /// Seed a fresh bundle at sign-in time.
    pub fn issue<I>(
        uid: i64,
        email: impl Into<String>,
        name: Option<String>,
        roles: I,
        tv: i64,
        now_ms: i64,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            uid,
            email: email.into(),
            name,
            roles: roles.into_iter().collect(),
            tv,
            last_refresh: now_ms,
        }
    }

    /// Milliseconds elapsed since the last claims refresh.
    pub fn refresh_age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.last_refresh
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    fn validate(&self) -> Result<(), String> {
        if self.uid <= 0 {
            return Err(format!("uid must be positive, got {}", self.uid));
        }
        Ok(())
    }
}

/// What actually goes over the wire: the claims plus registered JWT times.
#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    #[serde(flatten)]
    claims: SessionClaims,
    iat: i64,
    exp: i64,
}

/// A successfully verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSession {
    pub claims: SessionClaims,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Codec
// ============================================================================

/// Signs and verifies session tokens.
///
/// Built once at startup and shared (behind an `Arc`) by every worker.
#[derive(Clone)]
pub struct SessionTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    max_age: Duration,
    update_age: Duration,
}

impl fmt::Debug for SessionTokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenCodec")
            .field("secret", &"[REDACTED]")
            .field("max_age_secs", &self.max_age.num_seconds())
            .field("update_age_secs", &self.update_age.num_seconds())
            .finish()
    }
}

impl SessionTokenCodec {
    /// Create a codec from a shared secret and the two session lifetimes.
    ///
    /// ## Errors
    ///
    /// - secret shorter than [`MIN_SECRET_LEN`]
    /// - `max_age` of zero or out of range
    pub fn new(
        secret: &[u8],
        max_age: std::time::Duration,
        update_age: std::time::Duration,
    ) -> Result<Self, CodecError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(CodecError::WeakSecret(secret.len()));
        }

        let max_age = Duration::from_std(max_age)
            .map_err(|e| CodecError::InvalidLifetime(format!("max_age: {e}")))?;
        if max_age <= Duration::zero() {
            return Err(CodecError::InvalidLifetime(
                "max_age must be greater than zero".to_string(),
            ));
        }
        if Utc::now().checked_add_signed(max_age).is_none() {
            return Err(CodecError::InvalidLifetime(
                "max_age overflows the token expiry".to_string(),
            ));
        }
        let update_age = Duration::from_std(update_age)
            .map_err(|e| CodecError::InvalidLifetime(format!("update_age: {e}")))?;

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            max_age,
            update_age,
        })
    }

    /// Codec with the default 7 day lifetime and 24 hour renewal age.
    pub fn with_default_lifetimes(secret: &[u8]) -> Result<Self, CodecError> {
        Self::new(
            secret,
            std::time::Duration::from_secs(DEFAULT_MAX_AGE_SECS),
            std::time::Duration::from_secs(DEFAULT_UPDATE_AGE_SECS),
        )
    }

    /// Hard lifetime of a single issuance, in seconds (for cookie `Max-Age`).
    pub fn max_age_secs(&self) -> i64 {
        self.max_age.num_seconds()
    }

    /// Sign `claims` as issued at `now`. The payload is written verbatim.
    pub fn encode(&self, claims: &SessionClaims, now: DateTime<Utc>) -> Result<String, CodecError> {
        claims.validate().map_err(CodecError::InvalidClaims)?;

        let expires_at = now.checked_add_signed(self.max_age).ok_or_else(|| {
            CodecError::InvalidLifetime("token expiry out of range".to_string())
        })?;

        let envelope = TokenEnvelope {
            claims: claims.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        Ok(encode(&Header::new(JWT_ALGORITHM), &envelope, &self.encoding_key)?)
    }

    /// Verify signature, expiry and claim shape.
    pub fn decode(&self, token: &str) -> Result<DecodedSession, DecodeFailure> {
        let data = decode::<TokenEnvelope>(token, &self.decoding_key, &self.validation)?;
        let envelope = data.claims;

        envelope
            .claims
            .validate()
            .map_err(DecodeFailure::InvalidClaims)?;

        let issued_at = Utc
            .timestamp_opt(envelope.iat, 0)
            .single()
            .ok_or_else(|| DecodeFailure::InvalidClaims("iat out of range".to_string()))?;
        let expires_at = Utc
            .timestamp_opt(envelope.exp, 0)
            .single()
            .ok_or_else(|| DecodeFailure::InvalidClaims("exp out of range".to_string()))?;

        Ok(DecodedSession {
            claims: envelope.claims,
            issued_at,
            expires_at,
        })
    }

    /// Whether `decoded` is old enough to be reissued with a fresh expiry.
    pub fn needs_renewal(&self, decoded: &DecodedSession, now: DateTime<Utc>) -> bool {
        now - decoded.issued_at >= self.update_age
    }
}

// ============================================================================
// Tests
// ============================================================================
