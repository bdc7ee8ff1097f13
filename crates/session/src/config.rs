//! Session configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ORCHARD_API_URL` - Base URL of the Orchard backend API
//!
//! ## Optional
//! - `ORCHARD_CREDENTIAL_MODE` - `cookie` (default) or `bearer`
//! - `ORCHARD_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 15)

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::credentials::CredentialMode;

/// Default per-request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Session layer configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base URL of the Orchard backend API.
    pub api_url: Url,
    /// How credentials travel with requests.
    pub credential_mode: CredentialMode,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retry settings for the post-auth identity confirmation.
    pub identity_retry: IdentityRetry,
}

/// Bounded retry/backoff settings for re-querying the identity endpoint
/// after an auth mutation.
///
/// In cookie-mode deployments the session cookie may not be committed and
/// readable immediately after login; the identity endpoint is re-queried
/// with growing, jittered delays instead of sleeping a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct IdentityRetry {
    /// Maximum number of identity queries per confirmation.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt.
    pub initial_delay: Duration,
    /// Upper bound on the per-attempt delay.
    pub max_delay: Duration,
}

impl Default for IdentityRetry {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(800),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_required_env("ORCHARD_API_URL")?
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORCHARD_API_URL".to_string(), e.to_string()))?;

        let credential_mode = get_env_or_default("ORCHARD_CREDENTIAL_MODE", "cookie")
            .parse::<CredentialMode>()
            .map_err(|e| ConfigError::InvalidEnvVar("ORCHARD_CREDENTIAL_MODE".to_string(), e))?;

        let timeout_secs = get_env_or_default(
            "ORCHARD_REQUEST_TIMEOUT_SECS",
            &DEFAULT_REQUEST_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("ORCHARD_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
        })?;

        Ok(Self {
            api_url,
            credential_mode,
            request_timeout: Duration::from_secs(timeout_secs),
            identity_retry: IdentityRetry::default(),
        })
    }

    /// Build a configuration directly from its parts, with default timeout
    /// and retry settings.
    #[must_use]
    pub fn new(api_url: Url, credential_mode: CredentialMode) -> Self {
        Self {
            api_url,
            credential_mode,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            identity_retry: IdentityRetry::default(),
        }
    }
}

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
