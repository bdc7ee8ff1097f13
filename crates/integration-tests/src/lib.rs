//! Integration tests for the Orchard session layer.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p orchard-integration-tests
//! ```
//!
//! Every test drives a real [`orchard_session::AuthSession`] against a
//! `mockito` HTTP server standing in for the Orchard backend. The fixtures
//! here cover the pieces a browser runtime would normally provide: a
//! navigator that records requested routes instead of routing, and seeded
//! in-memory credential storage.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use orchard_session::{
    AuthSession, CredentialMode, CredentialStorage, IdentityRetry, MemoryStorage, Navigator,
    Route, SessionConfig, credentials::storage_keys,
};

/// A [`Navigator`] that records requested routes instead of navigating.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    /// Every route requested so far, in order.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().expect("navigator lock").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes.lock().expect("navigator lock").push(route);
    }
}

/// A session wired to a mock backend, plus handles to observe it.
pub struct TestSession {
    /// The mock backend; create mocks on it before driving the session.
    pub server: mockito::ServerGuard,
    /// The session under test.
    pub session: AuthSession,
    /// The storage backend, for seeding and inspecting persisted state.
    pub storage: Arc<MemoryStorage>,
    /// Records navigation requests.
    pub navigator: Arc<RecordingNavigator>,
}

impl TestSession {
    /// A bearer-mode session with empty storage.
    pub async fn bearer() -> Self {
        Self::build(CredentialMode::Bearer, &[]).await
    }

    /// A bearer-mode session with a persisted token pair.
    pub async fn bearer_with_tokens(access: &str, refresh: &str) -> Self {
        Self::build(
            CredentialMode::Bearer,
            &[
                (storage_keys::ACCESS_TOKEN, access),
                (storage_keys::REFRESH_TOKEN, refresh),
            ],
        )
        .await
    }

    /// A cookie-mode session with empty storage.
    pub async fn cookie() -> Self {
        Self::build(CredentialMode::Cookie, &[]).await
    }

    /// A cookie-mode session with a persisted session-presence marker.
    pub async fn cookie_with_session() -> Self {
        Self::build(CredentialMode::Cookie, &[(storage_keys::SESSION_PRESENT, "true")]).await
    }

    /// Seed an arbitrary storage entry alongside one of the presets.
    pub async fn bearer_with_entries(entries: &[(&str, &str)]) -> Self {
        Self::build(CredentialMode::Bearer, entries).await
    }

    async fn build(mode: CredentialMode, seed: &[(&str, &str)]) -> Self {
        init_tracing();

        let server = mockito::Server::new_async().await;

        let storage = Arc::new(MemoryStorage::default());
        for (key, value) in seed {
            storage.set(key, value);
        }

        let navigator = Arc::new(RecordingNavigator::default());

        let mut config = SessionConfig::new(
            server.url().parse().expect("mock server url"),
            mode,
        );
        // Keep confirmation backoff short so failure-path tests stay fast
        config.identity_retry = IdentityRetry {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
        };

        let session = AuthSession::new(
            config,
            Arc::clone(&storage) as Arc<dyn CredentialStorage>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        )
        .expect("session wiring");

        Self {
            server,
            session,
            storage,
            navigator,
        }
    }
}

/// An identity payload as the backend's `/auth/me/` endpoint returns it.
#[must_use]
pub fn identity_body(id: i64, first_name: &str, last_name: &str, email: &str, is_staff: bool) -> String {
    serde_json::json!({
        "id": id,
        "first_name": first_name,
        "last_name": last_name,
        "email": email,
        "is_staff": is_staff,
        "date_joined": "2024-01-15T10:30:00Z",
    })
    .to_string()
}

/// A bearer-mode token grant body.
#[must_use]
pub fn token_grant_body(access: &str, refresh: &str) -> String {
    serde_json::json!({ "access": access, "refresh": refresh }).to_string()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
