//! The authentication state machine.
//!
//! Owns the authoritative auth state and every operation that may change
//! it: login, register, external-identity login, logout, and startup
//! session resolution. The state is broadcast over a watch channel so any
//! number of observers see a consistent view; the navigation side effect is
//! separated behind the [`Navigator`] seam so the transitions themselves
//! stay pure and testable.
//!
//! Transitions are deliberately narrow: `Initializing` resolves exactly
//! once into `Authenticated` or `Unauthenticated`, and afterwards the state
//! only moves between those two via explicit login/logout-class operations
//! (an irrecoverable credential refresh counts as a logout).
//!
//! Every mutating operation re-derives the identity from the
//! current-identity endpoint rather than trusting the mutation response:
//! the session's canonical view always comes from one source. In
//! cookie-mode deployments that endpoint may briefly reject right after
//! login while the cookie commits, so the re-query retries with bounded,
//! jittered backoff instead of sleeping a fixed duration.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::watch;

use orchard_core::{Email, Role};

use crate::backend::{AuthApi, AuthGrant};
use crate::config::{IdentityRetry, SessionConfig};
use crate::credentials::{CredentialMode, CredentialSet};
use crate::error::SessionError;
use crate::models::UserIdentity;
use crate::refresh::{ExpiredSessionSink, RefreshCoordinator};
use crate::store::{CredentialStorage, CredentialStore};
use crate::transport::SessionClient;

/// Where the session layer asks the application to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Storefront home.
    Home,
    /// Login view.
    Login,
    /// Admin dashboard.
    AdminDashboard,
}

/// Performs navigation on behalf of the state machine.
///
/// The application shell implements this against its router; tests record
/// the requested routes.
pub trait Navigator: Send + Sync {
    /// Navigate to `route`.
    fn navigate(&self, route: Route);
}

/// Lifecycle phase of the auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Startup resolution has not completed yet.
    Initializing,
    /// No authenticated user.
    Unauthenticated,
    /// A confirmed user is present.
    Authenticated,
}

/// The authoritative {user, status} pair.
///
/// A user is carried if and only if the status is `Authenticated`, so the
/// invariant between the two cannot be violated by construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AuthState {
    /// Startup resolution has not completed yet.
    #[default]
    Initializing,
    /// No authenticated user.
    Unauthenticated,
    /// A confirmed user is present.
    Authenticated(UserIdentity),
}

impl AuthState {
    /// The lifecycle phase, without the identity payload.
    #[must_use]
    pub const fn status(&self) -> AuthStatus {
        match self {
            Self::Initializing => AuthStatus::Initializing,
            Self::Unauthenticated => AuthStatus::Unauthenticated,
            Self::Authenticated(_) => AuthStatus::Authenticated,
        }
    }

    /// The current user, present exactly when authenticated.
    #[must_use]
    pub const fn user(&self) -> Option<&UserIdentity> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Whether a confirmed user is present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// The session facade handed to the application.
///
/// Cheaply cloneable; all clones share one state machine, one credential
/// store, and one transport.
#[derive(Clone)]
pub struct AuthSession {
    api: AuthApi,
    transport: SessionClient,
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: CredentialStore,
    state: watch::Sender<AuthState>,
    navigator: Arc<dyn Navigator>,
    identity_retry: IdentityRetry,
    resolve_lock: tokio::sync::Mutex<()>,
}

impl AuthSession {
    /// Wire up the session layer: credential store, refresh coordinator,
    /// session client, and the state machine itself.
    ///
    /// # Errors
    ///
    /// `Transport` if the HTTP client cannot be constructed.
    pub fn new(
        config: SessionConfig,
        storage: Arc<dyn CredentialStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, SessionError> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if config.credential_mode == CredentialMode::Cookie {
            builder = builder.cookie_store(true);
        }
        let http = builder.build()?;

        let base_url = config.api_url.as_str().trim_end_matches('/').to_owned();
        let store = CredentialStore::new(config.credential_mode, storage);
        let refresh = RefreshCoordinator::new(http.clone(), base_url.clone(), store.clone());
        let transport = SessionClient::new(http, base_url, store.clone(), refresh.clone());
        let api = AuthApi::new(transport.clone());

        let (state, _) = watch::channel(AuthState::Initializing);
        let inner = Arc::new(SessionInner {
            store,
            state,
            navigator,
            identity_retry: config.identity_retry,
            resolve_lock: tokio::sync::Mutex::new(()),
        });

        // The coordinator reports irrecoverable refreshes back into the
        // state machine
        refresh.set_expiry_sink(Arc::clone(&inner) as Arc<dyn ExpiredSessionSink>);

        Ok(Self {
            api,
            transport,
            inner,
        })
    }

    /// The transport for any view that needs to call the backend.
    #[must_use]
    pub fn client(&self) -> SessionClient {
        self.transport.clone()
    }

    /// A snapshot of the current auth state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to auth state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// The persisted identity snapshot, if any.
    ///
    /// For optimistic rendering only; it may be stale and grants nothing.
    #[must_use]
    pub fn cached_identity(&self) -> Option<UserIdentity> {
        self.inner.store.cached_identity()
    }

    /// Resolve the session at startup: decide `Initializing` into
    /// `Authenticated` or `Unauthenticated` exactly once.
    ///
    /// Idempotent: once resolved, later calls return the current state
    /// without touching the network.
    pub async fn resolve_session(&self) -> AuthState {
        let _guard = self.inner.resolve_lock.lock().await;
        if !matches!(self.state(), AuthState::Initializing) {
            return self.state();
        }

        if !self.inner.store.has_credentials() {
            self.inner.state.send_replace(AuthState::Unauthenticated);
            return self.state();
        }

        match self.api.current_identity().await {
            Ok(user) => {
                self.inner.store.cache_identity(&user);
                self.inner
                    .state
                    .send_replace(AuthState::Authenticated(user));
            }
            Err(err) => {
                tracing::debug!(error = %err, "startup session resolution failed");
                // An expired session was already handled by the refresh
                // path; anything else leaves the stored credentials for a
                // later attempt but resolves this startup as signed out.
                if matches!(self.state(), AuthState::Initializing) {
                    self.inner.state.send_replace(AuthState::Unauthenticated);
                }
            }
        }

        self.state()
    }

    /// Log in with email and password.
    ///
    /// On success the identity is re-derived from the identity endpoint,
    /// the state becomes `Authenticated`, and navigation goes to the admin
    /// dashboard for admins or home for everyone else.
    ///
    /// # Errors
    ///
    /// Failures are classified (`Authentication`, `Validation`,
    /// `Transport`) and returned without mutating the auth state.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, SessionError> {
        let email = Email::parse(email)?;
        let grant = self.api.login(&email, password).await?;
        self.install_grant(grant)?;

        let user = self.confirm_identity().await?;
        self.commit_authenticated(user.clone());
        self.inner.navigator.navigate(landing_route(user.role));
        Ok(user)
    }

    /// Register a new account.
    ///
    /// The full name is split into first/last for the backend. On success
    /// navigation always goes home, regardless of role.
    ///
    /// # Errors
    ///
    /// `Validation` for rejected input (including a duplicate email);
    /// failures are returned without mutating the auth state.
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<UserIdentity, SessionError> {
        let email = Email::parse(email)?;
        let (first_name, last_name) = split_full_name(full_name);
        let grant = self
            .api
            .register(&first_name, &last_name, &email, password)
            .await?;
        self.install_grant(grant)?;

        let user = self.confirm_identity().await?;
        self.commit_authenticated(user.clone());
        self.inner.navigator.navigate(Route::Home);
        Ok(user)
    }

    /// Log in by exchanging an external identity provider's token.
    ///
    /// Redirects like [`Self::login`]: admin dashboard for admins, home
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Failures are classified and returned without mutating the auth
    /// state.
    pub async fn external_login(
        &self,
        identity_token: &str,
    ) -> Result<UserIdentity, SessionError> {
        let grant = self.api.external_login(identity_token).await?;
        self.install_grant(grant)?;

        let user = self.confirm_identity().await?;
        self.commit_authenticated(user.clone());
        self.inner.navigator.navigate(landing_route(user.role));
        Ok(user)
    }

    /// Log out.
    ///
    /// Best-effort on the wire: the backend is told, but any error is
    /// swallowed because the point of logout is to remove local trust,
    /// which must not depend on the server acknowledging. Local state
    /// clears unconditionally and navigation goes to the login view.
    pub async fn logout(&self) {
        if let Err(err) = self.api.logout().await {
            tracing::warn!(error = %err, "logout request failed; clearing local session anyway");
        }
        self.inner.store.clear();
        self.inner.state.send_replace(AuthState::Unauthenticated);
        self.inner.navigator.navigate(Route::Login);
    }

    /// Install the credentials issued by a login-class call.
    fn install_grant(&self, grant: AuthGrant) -> Result<(), SessionError> {
        match self.inner.store.mode() {
            CredentialMode::Bearer => match grant.tokens {
                Some(pair) => {
                    self.inner.store.install(CredentialSet::Bearer(pair));
                    Ok(())
                }
                None => Err(SessionError::Validation(
                    "authentication succeeded but the response carried no token pair".to_owned(),
                )),
            },
            CredentialMode::Cookie => {
                self.inner.store.install(CredentialSet::Cookie);
                Ok(())
            }
        }
    }

    /// Re-derive the authoritative identity after an auth mutation.
    ///
    /// Retries unauthorized and transport failures with doubling, jittered
    /// delays up to the configured attempt limit; other failures are final
    /// immediately.
    async fn confirm_identity(&self) -> Result<UserIdentity, SessionError> {
        let retry = self.inner.identity_retry;
        let mut delay = retry.initial_delay;
        let mut last_error = SessionError::Authentication("identity confirmation failed".to_owned());

        for attempt in 0..retry.max_attempts.max(1) {
            if attempt > 0 {
                let jitter = delay.mul_f64(rand::rng().random_range(0.0..0.5));
                tokio::time::sleep(delay + jitter).await;
                delay = (delay * 2).min(retry.max_delay);
            }

            match self.api.current_identity_once().await {
                Ok(user) => return Ok(user),
                Err(err @ (SessionError::Authentication(_) | SessionError::Transport(_))) => {
                    tracing::debug!(attempt, error = %err, "identity not readable yet");
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error)
    }

    /// Commit a confirmed identity: cache the snapshot and publish the
    /// authenticated state.
    fn commit_authenticated(&self, user: UserIdentity) {
        tracing::info!(role = %user.role, "session authenticated");
        self.inner.store.cache_identity(&user);
        self.inner.state.send_replace(AuthState::Authenticated(user));
    }
}

impl ExpiredSessionSink for SessionInner {
    fn session_expired(&self) {
        tracing::info!("session expired; redirecting to login");
        self.state.send_replace(AuthState::Unauthenticated);
        self.navigator.navigate(Route::Login);
    }
}

/// Post-auth landing route for login-class operations.
const fn landing_route(role: Role) -> Route {
    if role.is_admin() {
        Route::AdminDashboard
    } else {
        Route::Home
    }
}

/// Split a display name into the backend's first/last fields, the same way
/// the registration form does.
fn split_full_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.trim().split_whitespace();
    let first = parts.next().unwrap_or_default().to_owned();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}
