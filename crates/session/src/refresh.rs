//! The refresh coordinator.
//!
//! Many requests can fail for the same reason at the same time: the access
//! credential expired. The coordinator guarantees that one failure episode
//! produces at most one renewal call. The first caller to arrive starts a
//! refresh cycle; every caller arriving while that cycle is active joins a
//! FIFO queue and is resumed with the cycle's shared outcome. Failure is
//! terminal for the cycle: the credential set is cleared, the auth state is
//! forced to unauthenticated, and exactly one navigation to the login view
//! fires - regardless of how many callers were queued.

use std::sync::{Arc, OnceLock};

use secrecy::SecretString;
use tokio::sync::{Mutex, oneshot};

use crate::backend;
use crate::credentials::{CredentialMode, CredentialSet, TokenPair};
use crate::store::CredentialStore;

/// Shared outcome of one refresh cycle, observed identically by the
/// initiator and every queued waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
    /// New credentials are installed; callers should replay.
    Refreshed,
    /// The session could not be renewed; callers propagate their original
    /// failure.
    Expired,
}

/// Receiver of the terminal-failure side effect.
///
/// Implemented by the auth state machine: force the unauthenticated state
/// and navigate to login. Injected as a trait object so the coordinator
/// stays independent of the state machine it reports to.
pub(crate) trait ExpiredSessionSink: Send + Sync {
    fn session_expired(&self);
}

/// Single-flight coordinator for credential renewal.
#[derive(Clone)]
pub(crate) struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    http: reqwest::Client,
    base_url: String,
    store: CredentialStore,
    sink: OnceLock<Arc<dyn ExpiredSessionSink>>,
    /// `None` when idle; `Some(waiters)` while a cycle is in flight.
    cycle: Mutex<Option<Vec<oneshot::Sender<RefreshOutcome>>>>,
}

impl RefreshCoordinator {
    pub(crate) fn new(http: reqwest::Client, base_url: String, store: CredentialStore) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                http,
                base_url,
                store,
                sink: OnceLock::new(),
                cycle: Mutex::new(None),
            }),
        }
    }

    /// Install the terminal-failure sink. Called once during session wiring.
    pub(crate) fn set_expiry_sink(&self, sink: Arc<dyn ExpiredSessionSink>) {
        let _ = self.inner.sink.set(sink);
    }

    /// Obtain renewed credentials, sharing one renewal call per failure
    /// episode.
    ///
    /// If a cycle is already in flight the caller suspends on the queue and
    /// receives that cycle's outcome; otherwise the caller becomes the
    /// initiator, performs the renewal, and broadcasts the outcome to every
    /// queued waiter in arrival order.
    pub(crate) async fn acquire_refreshed_credentials(&self) -> RefreshOutcome {
        let waiter = {
            let mut cycle = self.inner.cycle.lock().await;
            match cycle.as_mut() {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    *cycle = Some(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            // A dropped sender means the initiator was cancelled mid-cycle;
            // treat that as a failed renewal.
            return rx.await.unwrap_or(RefreshOutcome::Expired);
        }

        let outcome = self.run_cycle().await;

        let waiters = self.inner.cycle.lock().await.take().unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome);
        }

        outcome
    }

    /// Perform one renewal call and commit its result.
    async fn run_cycle(&self) -> RefreshOutcome {
        let inner = &self.inner;
        let started_epoch = inner.store.refresh_epoch();

        let refresh_token: Option<SecretString> = match inner.store.current() {
            Some(CredentialSet::Bearer(pair)) => Some(pair.refresh_token().clone()),
            Some(CredentialSet::Cookie) => None,
            // Cleared between the failed request and cycle start (a logout
            // raced us); nothing to renew and nothing left to clear.
            None => return RefreshOutcome::Expired,
        };

        tracing::debug!("starting credential refresh cycle");

        let grant =
            match backend::renew_credentials(&inner.http, &inner.base_url, refresh_token.as_ref())
                .await
            {
                Ok(grant) => grant,
                Err(err) => {
                    tracing::warn!(error = %err, "credential refresh failed");
                    return self.expire();
                }
            };

        let renewed = match inner.store.mode() {
            CredentialMode::Bearer => {
                let Some(access) = grant.access else {
                    tracing::warn!("renewal response carried no access token");
                    return self.expire();
                };
                // Keep the old refresh token unless the backend rotated it
                let Some(refresh) = grant.refresh.map(SecretString::from).or(refresh_token)
                else {
                    // Unreachable in bearer mode: the cycle started from a
                    // stored pair
                    return self.expire();
                };
                CredentialSet::Bearer(TokenPair::from_parts(access, refresh))
            }
            CredentialMode::Cookie => CredentialSet::Cookie,
        };

        if inner.store.commit_refresh(renewed, started_epoch) {
            tracing::debug!("credential refresh succeeded");
            RefreshOutcome::Refreshed
        } else {
            // A logout landed while the renewal was in flight; it wins, and
            // it already handled state and navigation.
            tracing::debug!("renewed credentials discarded: store cleared during cycle");
            RefreshOutcome::Expired
        }
    }

    /// Terminal failure: clear credentials, reset auth state, and trigger
    /// the single navigation to login.
    fn expire(&self) -> RefreshOutcome {
        self.inner.store.clear();
        if let Some(sink) = self.inner.sink.get() {
            sink.session_expired();
        }
        RefreshOutcome::Expired
    }
}
