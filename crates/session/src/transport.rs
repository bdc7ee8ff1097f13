//! The session client.
//!
//! Every outbound call from the application goes through [`SessionClient`]:
//! it attaches the current credentials (bearer header or ambient cookie,
//! per mode), detects unauthorized responses, and recovers once per request
//! by waiting on the refresh coordinator and replaying the original call
//! with renewed credentials.
//!
//! A single request is retried at most once: the replay's response is
//! returned as-is, so the recovery path never loops even when the replay
//! also fails.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::credentials::CredentialSet;
use crate::error::SessionError;
use crate::refresh::{RefreshCoordinator, RefreshOutcome};
use crate::store::CredentialStore;

/// Credential-attaching HTTP transport.
///
/// Cheaply cloneable via `Arc`; hand clones to any view that needs to call
/// the backend. Views consume responses normally - the refresh protocol is
/// invisible to them.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    store: CredentialStore,
    refresh: RefreshCoordinator,
}

impl SessionClient {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: String,
        store: CredentialStore,
        refresh: RefreshCoordinator,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                store,
                refresh,
            }),
        }
    }

    /// Start building a request against the backend.
    ///
    /// `path` is joined to the configured base URL.
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.inner
            .http
            .request(method, format!("{}{}", self.inner.base_url, path))
    }

    /// Start building a GET request against the backend.
    #[must_use]
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Start building a POST request against the backend.
    #[must_use]
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Execute a request with credentials attached, recovering once from
    /// expired credentials.
    ///
    /// Non-success statuses are returned as ordinary responses; only
    /// transport-level failures are errors. When the response is
    /// unauthorized and a credential set is held, the call waits for the
    /// refresh coordinator and replays the original request exactly once
    /// with the renewed credentials; if renewal fails, the original
    /// unauthorized response is returned.
    ///
    /// # Errors
    ///
    /// `Transport` if the request cannot be built or executed.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SessionError> {
        let mut request = request.build()?;
        let replay = request.try_clone();
        let sent_access = self.attach_credentials(&mut request);

        let response = self.inner.http.execute(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !self.inner.store.has_credentials() {
            // An unauthenticated call (e.g. a rejected login) has nothing
            // to refresh
            return Ok(response);
        }

        let Some(mut replay) = replay else {
            // Streaming bodies cannot be replayed
            return Ok(response);
        };

        // Another caller may have renewed the credentials while this
        // request was in flight; replaying with the current set is enough
        // then, and avoids burning a second renewal on the same episode.
        let renewed_since_send = match (&sent_access, self.current_access_token()) {
            (Some(sent), Some(current)) => *sent != current,
            _ => false,
        };

        if !renewed_since_send {
            match self.inner.refresh.acquire_refreshed_credentials().await {
                RefreshOutcome::Refreshed => {}
                RefreshOutcome::Expired => return Ok(response),
            }
        }

        self.attach_credentials(&mut replay);
        let replayed = self.inner.http.execute(replay).await?;
        Ok(replayed)
    }

    /// Execute a request with credentials attached but without the
    /// expired-credential recovery path.
    pub(crate) async fn send_once(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SessionError> {
        let mut request = request.build()?;
        self.attach_credentials(&mut request);
        Ok(self.inner.http.execute(request).await?)
    }

    /// Attach the current credential set to `request`, returning the access
    /// token that was attached, if any.
    ///
    /// Cookie mode attaches nothing here: the session cookie rides on the
    /// client's cookie jar.
    fn attach_credentials(&self, request: &mut reqwest::Request) -> Option<String> {
        let Some(CredentialSet::Bearer(pair)) = self.inner.store.current() else {
            return None;
        };
        match HeaderValue::from_str(&format!("Bearer {}", pair.access_token())) {
            Ok(value) => {
                request.headers_mut().insert(AUTHORIZATION, value);
                Some(pair.access_token().to_owned())
            }
            Err(_) => {
                tracing::warn!("access token is not a valid header value; sending without it");
                None
            }
        }
    }

    fn current_access_token(&self) -> Option<String> {
        match self.inner.store.current() {
            Some(CredentialSet::Bearer(pair)) => Some(pair.access_token().to_owned()),
            _ => None,
        }
    }
}
