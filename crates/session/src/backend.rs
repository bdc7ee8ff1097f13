//! Typed client for the Orchard backend's auth endpoints.
//!
//! Six contracts are consumed: login, register, external-identity exchange,
//! session refresh, current identity, and logout. Requests go through the
//! [`SessionClient`] so protected calls benefit from credential attachment
//! and expired-credential recovery; the renewal call itself is issued
//! directly (see [`renew_credentials`]) because it must never re-enter the
//! recovery path.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use orchard_core::{Email, Role, UserId};

use crate::credentials::TokenPair;
use crate::error::SessionError;
use crate::models::UserIdentity;
use crate::transport::SessionClient;

pub(crate) const LOGIN_PATH: &str = "/auth/login/";
pub(crate) const REGISTER_PATH: &str = "/auth/register/";
pub(crate) const EXTERNAL_LOGIN_PATH: &str = "/auth/google/";
pub(crate) const REFRESH_PATH: &str = "/auth/refresh/";
pub(crate) const IDENTITY_PATH: &str = "/auth/me/";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout/";

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct ExternalLoginRequest<'a> {
    id_token: &'a str,
}

/// Token material returned by login-class and refresh endpoints.
///
/// Cookie-mode deployments return neither field (the server sets its
/// cookie instead); bearer-mode deployments return both on login and at
/// least a new access token on refresh.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenGrantResponse {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// Identity payload from the current-identity endpoint.
#[derive(Debug, Deserialize)]
struct IdentityResponse {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    is_staff: bool,
    date_joined: DateTime<Utc>,
}

impl IdentityResponse {
    fn full_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => String::new(),
        }
    }
}

impl TryFrom<IdentityResponse> for UserIdentity {
    type Error = SessionError;

    fn try_from(payload: IdentityResponse) -> Result<Self, Self::Error> {
        let full_name = payload.full_name();
        Ok(Self {
            id: UserId::new(payload.id),
            full_name,
            email: Email::parse(&payload.email)?,
            role: if payload.is_staff {
                Role::Admin
            } else {
                Role::Customer
            },
            created_at: payload.date_joined,
        })
    }
}

/// Outcome of a successful login-class call.
#[derive(Debug)]
pub struct AuthGrant {
    /// Token pair issued by a bearer-mode deployment; `None` in cookie mode.
    pub tokens: Option<TokenPair>,
}

impl From<TokenGrantResponse> for AuthGrant {
    fn from(response: TokenGrantResponse) -> Self {
        let tokens = match (response.access, response.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
            _ => None,
        };
        Self { tokens }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth API Client
// ─────────────────────────────────────────────────────────────────────────────

/// Typed access to the backend's auth endpoints.
#[derive(Clone)]
pub struct AuthApi {
    transport: SessionClient,
}

impl AuthApi {
    pub(crate) const fn new(transport: SessionClient) -> Self {
        Self { transport }
    }

    /// Exchange email and password for a session.
    ///
    /// # Errors
    ///
    /// `Authentication` for rejected credentials, `Validation` for rejected
    /// input, `Transport` for network failures.
    pub async fn login(&self, email: &Email, password: &str) -> Result<AuthGrant, SessionError> {
        let request = self.transport.post(LOGIN_PATH).json(&LoginRequest {
            email: email.as_str(),
            password,
        });
        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(SessionError::from_response(response).await);
        }
        let grant: TokenGrantResponse = response.json().await?;
        Ok(grant.into())
    }

    /// Create an account. The backend rejects a duplicate email with a
    /// validation error.
    ///
    /// # Errors
    ///
    /// `Validation` for rejected input (including duplicate email),
    /// `Transport` for network failures.
    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        email: &Email,
        password: &str,
    ) -> Result<AuthGrant, SessionError> {
        let request = self.transport.post(REGISTER_PATH).json(&RegisterRequest {
            first_name,
            last_name,
            email: email.as_str(),
            password,
        });
        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(SessionError::from_response(response).await);
        }
        let grant: TokenGrantResponse = response.json().await?;
        Ok(grant.into())
    }

    /// Exchange an external identity provider's token for a session.
    ///
    /// # Errors
    ///
    /// `Authentication` if the provider token is rejected, `Transport` for
    /// network failures.
    pub async fn external_login(&self, identity_token: &str) -> Result<AuthGrant, SessionError> {
        let request = self
            .transport
            .post(EXTERNAL_LOGIN_PATH)
            .json(&ExternalLoginRequest {
                id_token: identity_token,
            });
        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(SessionError::from_response(response).await);
        }
        let grant: TokenGrantResponse = response.json().await?;
        Ok(grant.into())
    }

    /// Fetch the current identity, recovering from expired credentials.
    ///
    /// # Errors
    ///
    /// `Authentication` when no session is established, `Transport` for
    /// network failures.
    pub async fn current_identity(&self) -> Result<UserIdentity, SessionError> {
        let response = self.transport.send(self.transport.get(IDENTITY_PATH)).await?;
        Self::decode_identity(response).await
    }

    /// Fetch the current identity without entering the refresh path.
    ///
    /// Used by the post-auth confirmation loop: an unauthorized response
    /// right after login means the new credentials are still propagating,
    /// not that the session expired.
    pub(crate) async fn current_identity_once(&self) -> Result<UserIdentity, SessionError> {
        let response = self
            .transport
            .send_once(self.transport.get(IDENTITY_PATH))
            .await?;
        Self::decode_identity(response).await
    }

    /// Tell the backend the session is over. Callers decide how much they
    /// care about the answer.
    ///
    /// # Errors
    ///
    /// `Authentication` or `Transport` per the response; logout callers
    /// typically log and ignore these.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let response = self.transport.send_once(self.transport.post(LOGOUT_PATH)).await?;
        if !response.status().is_success() {
            return Err(SessionError::from_response(response).await);
        }
        Ok(())
    }

    async fn decode_identity(response: reqwest::Response) -> Result<UserIdentity, SessionError> {
        if !response.status().is_success() {
            return Err(SessionError::from_response(response).await);
        }
        let payload: IdentityResponse = response.json().await?;
        payload.try_into()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential Renewal
// ─────────────────────────────────────────────────────────────────────────────

/// Call the renewal endpoint with the stored refresh credential.
///
/// Issued on a bare HTTP client: the renewal call must never recurse into
/// the session client's own recovery path. In cookie mode the body is empty
/// and the rotated cookie rides back on the response.
pub(crate) async fn renew_credentials(
    http: &reqwest::Client,
    base_url: &str,
    refresh_token: Option<&SecretString>,
) -> Result<TokenGrantResponse, SessionError> {
    let body = match refresh_token {
        Some(token) => serde_json::json!({ "refresh": token.expose_secret() }),
        None => serde_json::json!({}),
    };

    let response = http
        .post(format!("{base_url}{REFRESH_PATH}"))
        .json(&body)
        .send()
        .await?;

    // A rejected refresh credential means the session itself is over;
    // anything else is an ordinary backend failure
    if matches!(
        response.status(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
        return Err(SessionError::SessionExpired);
    }
    if !response.status().is_success() {
        return Err(SessionError::from_response(response).await);
    }

    // Cookie-mode deployments may answer with an empty body
    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(TokenGrantResponse::default());
    }
    Ok(serde_json::from_str(&text).unwrap_or_default())
}
