//! Credential types and storage keys.
//!
//! Two mutually exclusive transport strategies are supported per
//! deployment: bearer-token mode, where the client holds a renewable token
//! pair and attaches the access token as a request header, and cookie mode,
//! where the server manages an `HttpOnly` session cookie and the client only
//! tracks whether one was established.

use core::fmt;

use secrecy::{ExposeSecret, SecretString};

/// How credentials travel with requests. Exactly one mode is active per
/// deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// Token pair held client-side, attached via `Authorization` header.
    Bearer,
    /// `HttpOnly` session cookie managed by the server; the client holds no
    /// readable token.
    Cookie,
}

impl fmt::Display for CredentialMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer => write!(f, "bearer"),
            Self::Cookie => write!(f, "cookie"),
        }
    }
}

impl std::str::FromStr for CredentialMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bearer" => Ok(Self::Bearer),
            "cookie" => Ok(Self::Cookie),
            _ => Err(format!("invalid credential mode: {s}")),
        }
    }
}

/// A renewable bearer-token pair.
///
/// Implements `Debug` manually to redact the refresh token.
#[derive(Clone)]
pub struct TokenPair {
    access: String,
    refresh: SecretString,
}

impl TokenPair {
    /// Create a token pair from the raw token strings.
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: SecretString::from(refresh.into()),
        }
    }

    /// Assemble a pair from an access token and an already-wrapped refresh
    /// token.
    pub(crate) const fn from_parts(access: String, refresh: SecretString) -> Self {
        Self { access, refresh }
    }

    /// The access token attached to outbound requests.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access
    }

    /// The refresh token presented to the renewal endpoint.
    #[must_use]
    pub const fn refresh_token(&self) -> &SecretString {
        &self.refresh
    }

    /// The refresh token as a plain string, for persistence only.
    pub(crate) fn refresh_token_exposed(&self) -> &str {
        self.refresh.expose_secret()
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &self.access)
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

/// The renewable proof of identity held by the client.
///
/// Created on successful login/register/external-login, replaced on
/// successful refresh, cleared on logout or irrecoverable refresh failure.
#[derive(Debug, Clone)]
pub enum CredentialSet {
    /// Bearer-mode token pair.
    Bearer(TokenPair),
    /// Cookie-mode marker: a session cookie was established.
    Cookie,
}

impl CredentialSet {
    /// The transport mode this credential set belongs to.
    #[must_use]
    pub const fn mode(&self) -> CredentialMode {
        match self {
            Self::Bearer(_) => CredentialMode::Bearer,
            Self::Cookie => CredentialMode::Cookie,
        }
    }
}

/// Storage keys for persisted session data.
pub mod storage_keys {
    /// Key for the bearer access token.
    pub const ACCESS_TOKEN: &str = "orchard.access_token";

    /// Key for the bearer refresh token.
    pub const REFRESH_TOKEN: &str = "orchard.refresh_token";

    /// Key for the cookie-mode session-presence marker.
    pub const SESSION_PRESENT: &str = "orchard.session_present";

    /// Key for the cached identity snapshot.
    pub const CURRENT_USER: &str = "orchard.current_user";
}
