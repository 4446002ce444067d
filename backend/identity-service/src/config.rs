//! Configuration management for Identity Service
//!
//! Loads settings from environment variables; a `.env` file is read first in
//! debug builds for local development.
//!
//! # Example
//!
//! ```no_run
//! use identity_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Listening on {}", settings.server.bind_address());
//!     Ok(())
//! }
//! ```

use actix_middleware::{RefreshFailureMode, RefreshPolicy, SessionCookieConfig, DEFAULT_COOKIE_NAME};
use anyhow::{bail, Context, Result};
use crypto_core::jwt::{DEFAULT_MAX_AGE_SECS, DEFAULT_UPDATE_AGE_SECS, MIN_SECRET_LEN};
use crypto_core::SessionTokenCodec;
use db_pool::env_utils::{parse_env_flag, parse_env_with_default};
use db_pool::DbConfig;
use std::env;
use std::fmt;
use std::time::Duration;

const SERVICE_NAME: &str = "identity-service";

/// Application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: DbConfig,
    pub session: SessionSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings from environment variables (.env file in development)
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) && dotenvy::dotenv().is_ok() {
            tracing::info!("Loaded .env file for development");
        }

        Self::from_env()
    }

    /// Read settings from the process environment only
    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            database: DbConfig::from_env(SERVICE_NAME).map_err(anyhow::Error::msg)?,
            session: SessionSettings::from_env()?,
            server: ServerSettings::from_env(),
        })
    }
}

/// Session token, refresh and cookie settings
#[derive(Clone)]
pub struct SessionSettings {
    pub secret: String,
    pub max_age_secs: u64,
    pub update_age_secs: u64,
    /// Already clamped: negative configured values become zero
    pub claims_refresh_ms: i64,
    pub store_timeout_ms: u64,
    pub failure_mode: RefreshFailureMode,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("secret", &"[REDACTED]")
            .field("max_age_secs", &self.max_age_secs)
            .field("update_age_secs", &self.update_age_secs)
            .field("claims_refresh_ms", &self.claims_refresh_ms)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("failure_mode", &self.failure_mode)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl SessionSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!(
                "SESSION_SECRET must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                secret.len()
            );
        }

        let failure_mode = match env::var("SESSION_REFRESH_FAILURE_MODE") {
            Ok(raw) => raw
                .parse::<RefreshFailureMode>()
                .map_err(anyhow::Error::msg)
                .context("Invalid SESSION_REFRESH_FAILURE_MODE")?,
            Err(_) => RefreshFailureMode::default(),
        };

        let cookie_name = env::var("SESSION_COOKIE_NAME")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string());

        Ok(Self {
            secret,
            max_age_secs: parse_env_with_default("SESSION_MAX_AGE_SECS", DEFAULT_MAX_AGE_SECS),
            update_age_secs: parse_env_with_default(
                "SESSION_UPDATE_AGE_SECS",
                DEFAULT_UPDATE_AGE_SECS,
            ),
            claims_refresh_ms: parse_env_with_default::<i64>("SESSION_CLAIMS_REFRESH_MS", 0).max(0),
            store_timeout_ms: parse_env_with_default("SESSION_STORE_TIMEOUT_MS", 500),
            failure_mode,
            cookie_name,
            cookie_secure: parse_env_flag("SESSION_COOKIE_SECURE"),
        })
    }

    pub fn codec(&self) -> Result<SessionTokenCodec> {
        SessionTokenCodec::new(
            self.secret.as_bytes(),
            Duration::from_secs(self.max_age_secs),
            Duration::from_secs(self.update_age_secs),
        )
        .context("Failed to build session token codec")
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            interval: RefreshPolicy::interval_from_millis(self.claims_refresh_ms),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            failure_mode: self.failure_mode,
        }
    }

    pub fn cookie(&self) -> SessionCookieConfig {
        SessionCookieConfig {
            name: self.cookie_name.clone(),
            secure: self.cookie_secure,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Self {
        Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env_with_default("SERVER_PORT", 8080),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
