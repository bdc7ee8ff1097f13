//! Route guards.
//!
//! Pure predicates over [`AuthState`] that decide whether a view may
//! render. Guards never touch the network; they only read the state the
//! auth machine publishes.
//!
//! All variants share one evaluation order: while the state is still
//! `Initializing` the guard asks for a neutral pending placeholder and
//! makes no access decision, so a stale persisted snapshot can never cause
//! a redirect flicker before startup resolution completes.

use orchard_core::Role;

use crate::session::{AuthState, Route};

/// What a guard asks the application to render or do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the requested view.
    Allow,
    /// Render a neutral placeholder; resolution is still in flight.
    Pending,
    /// Navigate away instead of rendering.
    Redirect(Route),
    /// Render the configured not-authorized view in place.
    Fallback,
}

/// How a guard responds when access is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DenialBehavior {
    /// Navigate to the appropriate route.
    #[default]
    Redirect,
    /// Render a not-authorized view in place.
    RenderFallback,
}

/// Per-guard denial policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuardPolicy {
    /// Applied when the caller is not authenticated at all.
    pub on_unauthenticated: DenialBehavior,
    /// Applied when the caller is authenticated but lacks the role.
    pub on_wrong_role: DenialBehavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardKind {
    Protected,
    AdminOnly,
    PublicOnly,
}

/// A route guard: one of the three access variants plus its denial policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteGuard {
    kind: GuardKind,
    policy: GuardPolicy,
}

impl RouteGuard {
    /// Guard requiring an authenticated user.
    #[must_use]
    pub const fn protected() -> Self {
        Self {
            kind: GuardKind::Protected,
            policy: GuardPolicy {
                on_unauthenticated: DenialBehavior::Redirect,
                on_wrong_role: DenialBehavior::Redirect,
            },
        }
    }

    /// Guard requiring an authenticated admin.
    #[must_use]
    pub const fn admin_only() -> Self {
        Self {
            kind: GuardKind::AdminOnly,
            ..Self::protected()
        }
    }

    /// Guard for views that only make sense signed out (login, register).
    #[must_use]
    pub const fn public_only() -> Self {
        Self {
            kind: GuardKind::PublicOnly,
            ..Self::protected()
        }
    }

    /// Replace the denial policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: GuardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Evaluate the guard against the current auth state.
    #[must_use]
    pub fn evaluate(&self, state: &AuthState) -> GuardDecision {
        // No decision before startup resolution completes
        if matches!(state, AuthState::Initializing) {
            return GuardDecision::Pending;
        }

        match self.kind {
            GuardKind::Protected => match state.user() {
                Some(_) => GuardDecision::Allow,
                None => deny(self.policy.on_unauthenticated, Route::Login),
            },
            GuardKind::AdminOnly => match state.user() {
                Some(user) if user.role.is_admin() => GuardDecision::Allow,
                Some(_) => deny(self.policy.on_wrong_role, Route::Home),
                None => deny(self.policy.on_unauthenticated, Route::Login),
            },
            GuardKind::PublicOnly => match state.user() {
                // Already signed in: send the user where they belong
                Some(user) if user.role == Role::Admin => {
                    GuardDecision::Redirect(Route::AdminDashboard)
                }
                Some(_) => GuardDecision::Redirect(Route::Home),
                None => GuardDecision::Allow,
            },
        }
    }
}

const fn deny(behavior: DenialBehavior, route: Route) -> GuardDecision {
    match behavior {
        DenialBehavior::Redirect => GuardDecision::Redirect(route),
        DenialBehavior::RenderFallback => GuardDecision::Fallback,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orchard_core::{Email, UserId};

    use crate::models::UserIdentity;

    fn authenticated(role: Role) -> AuthState {
        AuthState::Authenticated(UserIdentity {
            id: UserId::new(1),
            full_name: "Kim Diaz".to_owned(),
            email: Email::parse("kim@store.test").unwrap(),
            role,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn test_all_guards_pend_while_initializing() {
        // Even if persisted storage still holds a stale identity snapshot,
        // an unresolved state renders the placeholder and never redirects.
        for guard in [
            RouteGuard::protected(),
            RouteGuard::admin_only(),
            RouteGuard::public_only(),
        ] {
            assert_eq!(
                guard.evaluate(&AuthState::Initializing),
                GuardDecision::Pending
            );
        }
    }

    #[test]
    fn test_protected_guard() {
        let guard = RouteGuard::protected();
        assert_eq!(
            guard.evaluate(&authenticated(Role::Customer)),
            GuardDecision::Allow
        );
        assert_eq!(
            guard.evaluate(&AuthState::Unauthenticated),
            GuardDecision::Redirect(Route::Login)
        );
    }

    #[test]
    fn test_admin_guard() {
        let guard = RouteGuard::admin_only();
        assert_eq!(
            guard.evaluate(&authenticated(Role::Admin)),
            GuardDecision::Allow
        );
        assert_eq!(
            guard.evaluate(&authenticated(Role::Customer)),
            GuardDecision::Redirect(Route::Home)
        );
        assert_eq!(
            guard.evaluate(&AuthState::Unauthenticated),
            GuardDecision::Redirect(Route::Login)
        );
    }

    #[test]
    fn test_public_only_guard_redirects_by_role() {
        let guard = RouteGuard::public_only();
        assert_eq!(
            guard.evaluate(&AuthState::Unauthenticated),
            GuardDecision::Allow
        );
        assert_eq!(
            guard.evaluate(&authenticated(Role::Customer)),
            GuardDecision::Redirect(Route::Home)
        );
        assert_eq!(
            guard.evaluate(&authenticated(Role::Admin)),
            GuardDecision::Redirect(Route::AdminDashboard)
        );
    }

    #[test]
    fn test_render_fallback_policy() {
        let policy = GuardPolicy {
            on_unauthenticated: DenialBehavior::RenderFallback,
            on_wrong_role: DenialBehavior::RenderFallback,
        };

        let guard = RouteGuard::admin_only().with_policy(policy);
        assert_eq!(
            guard.evaluate(&AuthState::Unauthenticated),
            GuardDecision::Fallback
        );
        assert_eq!(
            guard.evaluate(&authenticated(Role::Customer)),
            GuardDecision::Fallback
        );
    }
}
