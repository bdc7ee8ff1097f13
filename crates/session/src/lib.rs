//! Orchard Session - the client-side session layer for the Orchard
//! storefront.
//!
//! This crate owns everything the rest of the application needs to answer
//! "who is the current user" and "is it safe to call the backend right now":
//!
//! - [`store`] - the credential store: token pair or cookie-presence marker,
//!   persisted under defined keys through a pluggable storage backend
//! - [`transport`] - the session client: attaches credentials to outbound
//!   requests and transparently recovers from expired ones
//! - the refresh coordinator - guarantees at most one credential renewal is
//!   in flight at a time and broadcasts its outcome to every blocked caller
//! - [`session`] - the authentication state machine: login, register,
//!   external-identity login, logout, and startup session resolution, with
//!   deterministic post-auth redirection
//! - [`guards`] - pure route-guard predicates over the authentication state
//!
//! Views outside this crate receive read-only access to [`AuthState`] and
//! use [`SessionClient`] as their transport; none of them participate in
//! the refresh protocol.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod guards;
pub mod models;
mod refresh;
pub mod session;
pub mod store;
pub mod transport;

pub use backend::AuthApi;
pub use config::{ConfigError, IdentityRetry, SessionConfig};
pub use credentials::{CredentialMode, CredentialSet, TokenPair};
pub use error::SessionError;
pub use guards::{DenialBehavior, GuardDecision, GuardPolicy, RouteGuard};
pub use models::UserIdentity;
pub use session::{AuthSession, AuthState, AuthStatus, Navigator, Route};
pub use store::{CredentialStorage, CredentialStore, MemoryStorage};
pub use transport::SessionClient;
