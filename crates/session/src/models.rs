//! Session domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orchard_core::{Email, Role, UserId};

/// The authenticated user, as last confirmed by the identity endpoint.
///
/// Treated as an immutable snapshot: never patched field-by-field, always
/// replaced wholesale from a fresh read of `/auth/me/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// The user's backend ID.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// The user's email address.
    pub email: Email,
    /// Role controlling admin access.
    pub role: Role,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}
