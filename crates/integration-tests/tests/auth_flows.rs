//! Authentication flow tests: login, register, external login, logout, and
//! startup session resolution.

use mockito::Matcher;

use orchard_core::Role;
use orchard_integration_tests::{TestSession, identity_body, token_grant_body};
use orchard_session::credentials::storage_keys;
use orchard_session::{
    AuthStatus, CredentialStorage, GuardDecision, Route, RouteGuard, SessionError,
};

#[tokio::test]
async fn test_login_as_admin_redirects_to_dashboard() {
    let mut ctx = TestSession::bearer().await;

    let login = ctx
        .server
        .mock("POST", "/auth/login/")
        .match_body(Matcher::Json(serde_json::json!({
            "email": "admin@store.test",
            "password": "secret",
        })))
        .with_status(200)
        .with_body(token_grant_body("a1", "r1"))
        .expect(1)
        .create_async()
        .await;

    let me = ctx
        .server
        .mock("GET", "/auth/me/")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_body(identity_body(1, "Avery", "Stone", "admin@store.test", true))
        .expect(1)
        .create_async()
        .await;

    let user = ctx
        .session
        .login("admin@store.test", "secret")
        .await
        .expect("login should succeed");

    assert_eq!(user.role, Role::Admin);
    assert_eq!(ctx.session.state().status(), AuthStatus::Authenticated);
    assert_eq!(ctx.navigator.routes(), vec![Route::AdminDashboard]);
    // The confirmed identity is cached for optimistic rendering
    assert!(ctx.storage.get(storage_keys::CURRENT_USER).is_some());

    login.assert_async().await;
    me.assert_async().await;
}

#[tokio::test]
async fn test_login_as_customer_redirects_home() {
    let mut ctx = TestSession::bearer().await;

    ctx.server
        .mock("POST", "/auth/login/")
        .with_status(200)
        .with_body(token_grant_body("a1", "r1"))
        .create_async()
        .await;
    ctx.server
        .mock("GET", "/auth/me/")
        .with_status(200)
        .with_body(identity_body(2, "Noor", "Haddad", "noor@store.test", false))
        .create_async()
        .await;

    let user = ctx
        .session
        .login("noor@store.test", "secret")
        .await
        .expect("login should succeed");

    assert_eq!(user.role, Role::Customer);
    assert_eq!(ctx.navigator.routes(), vec![Route::Home]);
}

#[tokio::test]
async fn test_rejected_login_is_classified_and_leaves_state_untouched() {
    let mut ctx = TestSession::bearer().await;

    ctx.session.resolve_session().await;
    assert_eq!(ctx.session.state().status(), AuthStatus::Unauthenticated);

    ctx.server
        .mock("POST", "/auth/login/")
        .with_status(401)
        .with_body(r#"{"detail": "No active account found with the given credentials"}"#)
        .create_async()
        .await;
    // A rejected login must not be mistaken for an expired session
    let refresh = ctx
        .server
        .mock("POST", "/auth/refresh/")
        .expect(0)
        .create_async()
        .await;

    let err = ctx
        .session
        .login("noor@store.test", "wrong")
        .await
        .expect_err("login should be rejected");

    assert!(matches!(err, SessionError::Authentication(_)));
    assert_eq!(ctx.session.state().status(), AuthStatus::Unauthenticated);
    assert!(ctx.navigator.routes().is_empty());

    refresh.assert_async().await;
}

#[tokio::test]
async fn test_register_splits_name_and_always_redirects_home() {
    let mut ctx = TestSession::bearer().await;

    let register = ctx
        .server
        .mock("POST", "/auth/register/")
        .match_body(Matcher::Json(serde_json::json!({
            "first_name": "Ada",
            "last_name": "Lovelace King",
            "email": "ada@store.test",
            "password": "secret",
        })))
        .with_status(201)
        .with_body(token_grant_body("a1", "r1"))
        .expect(1)
        .create_async()
        .await;

    // Even an admin identity lands on home after registering
    ctx.server
        .mock("GET", "/auth/me/")
        .with_status(200)
        .with_body(identity_body(3, "Ada", "Lovelace King", "ada@store.test", true))
        .create_async()
        .await;

    let user = ctx
        .session
        .register("Ada Lovelace King", "ada@store.test", "secret")
        .await
        .expect("register should succeed");

    assert_eq!(user.role, Role::Admin);
    assert_eq!(ctx.navigator.routes(), vec![Route::Home]);

    register.assert_async().await;
}

#[tokio::test]
async fn test_register_with_duplicate_email_is_a_validation_error() {
    let mut ctx = TestSession::bearer().await;

    ctx.session.resolve_session().await;

    ctx.server
        .mock("POST", "/auth/register/")
        .with_status(400)
        .with_body(r#"{"email": ["email already in use"]}"#)
        .create_async()
        .await;

    let err = ctx
        .session
        .register("Sam Reyes", "taken@store.test", "secret")
        .await
        .expect_err("register should be rejected");

    match err {
        SessionError::Validation(message) => assert_eq!(message, "email already in use"),
        other => panic!("expected a validation error, got {other:?}"),
    }
    assert_eq!(ctx.session.state().status(), AuthStatus::Unauthenticated);
    assert!(ctx.navigator.routes().is_empty());
}

#[tokio::test]
async fn test_external_login_exchanges_provider_token() {
    let mut ctx = TestSession::bearer().await;

    let exchange = ctx
        .server
        .mock("POST", "/auth/google/")
        .match_body(Matcher::Json(serde_json::json!({ "id_token": "provider-jwt" })))
        .with_status(200)
        .with_body(token_grant_body("a1", "r1"))
        .expect(1)
        .create_async()
        .await;

    ctx.server
        .mock("GET", "/auth/me/")
        .with_status(200)
        .with_body(identity_body(4, "Avery", "Stone", "admin@store.test", true))
        .create_async()
        .await;

    let user = ctx
        .session
        .external_login("provider-jwt")
        .await
        .expect("exchange should succeed");

    assert_eq!(user.role, Role::Admin);
    assert_eq!(ctx.navigator.routes(), vec![Route::AdminDashboard]);

    exchange.assert_async().await;
}

#[tokio::test]
async fn test_resolve_session_without_credentials_skips_the_network() {
    let mut ctx = TestSession::bearer().await;

    let me = ctx
        .server
        .mock("GET", "/auth/me/")
        .expect(0)
        .create_async()
        .await;

    let state = ctx.session.resolve_session().await;

    assert_eq!(state.status(), AuthStatus::Unauthenticated);
    me.assert_async().await;
}

#[tokio::test]
async fn test_resolve_session_is_idempotent() {
    let mut ctx = TestSession::bearer_with_tokens("a1", "r1").await;

    let me = ctx
        .server
        .mock("GET", "/auth/me/")
        .match_header("authorization", "Bearer a1")
        .with_status(200)
        .with_body(identity_body(5, "Noor", "Haddad", "noor@store.test", false))
        .expect(1)
        .create_async()
        .await;

    let first = ctx.session.resolve_session().await;
    let second = ctx.session.resolve_session().await;

    assert_eq!(first.status(), AuthStatus::Authenticated);
    assert_eq!(first, second);
    // The second call answered from state, not the network
    me.assert_async().await;
}

#[tokio::test]
async fn test_logout_clears_local_state_even_when_the_backend_errors() {
    let mut ctx = TestSession::bearer_with_tokens("a1", "r1").await;

    ctx.server
        .mock("GET", "/auth/me/")
        .with_status(200)
        .with_body(identity_body(6, "Noor", "Haddad", "noor@store.test", false))
        .create_async()
        .await;
    ctx.session.resolve_session().await;
    assert_eq!(ctx.session.state().status(), AuthStatus::Authenticated);

    ctx.server
        .mock("POST", "/auth/logout/")
        .with_status(500)
        .with_body("backend exploded")
        .create_async()
        .await;

    ctx.session.logout().await;

    assert_eq!(ctx.session.state().status(), AuthStatus::Unauthenticated);
    assert!(ctx.storage.get(storage_keys::ACCESS_TOKEN).is_none());
    assert!(ctx.storage.get(storage_keys::REFRESH_TOKEN).is_none());
    assert!(ctx.storage.get(storage_keys::CURRENT_USER).is_none());
    assert_eq!(ctx.navigator.routes(), vec![Route::Login]);
}

#[tokio::test]
async fn test_guards_stay_pending_before_resolution_despite_stale_snapshot() {
    let stale_snapshot = serde_json::json!({
        "id": 9,
        "full_name": "Old User",
        "email": "old@store.test",
        "role": "admin",
        "created_at": "2023-06-01T00:00:00Z",
    })
    .to_string();

    let ctx = TestSession::bearer_with_entries(&[(
        storage_keys::CURRENT_USER,
        stale_snapshot.as_str(),
    )])
    .await;

    // The snapshot is readable for optimistic rendering...
    assert!(ctx.session.cached_identity().is_some());

    // ...but guards make no access decision until resolution completes
    let state = ctx.session.state();
    assert_eq!(state.status(), AuthStatus::Initializing);
    for guard in [
        RouteGuard::protected(),
        RouteGuard::admin_only(),
        RouteGuard::public_only(),
    ] {
        assert_eq!(guard.evaluate(&state), GuardDecision::Pending);
    }
    assert!(ctx.navigator.routes().is_empty());
}

#[tokio::test]
async fn test_cookie_mode_login_rides_the_session_cookie() {
    let mut ctx = TestSession::cookie().await;

    ctx.server
        .mock("POST", "/auth/login/")
        .with_status(200)
        .with_header("set-cookie", "sessionid=abc123; Path=/")
        .with_body("{}")
        .create_async()
        .await;

    let me = ctx
        .server
        .mock("GET", "/auth/me/")
        .match_header("cookie", Matcher::Regex("sessionid=abc123".to_owned()))
        .with_status(200)
        .with_body(identity_body(7, "Noor", "Haddad", "noor@store.test", false))
        .create_async()
        .await;

    let user = ctx
        .session
        .login("noor@store.test", "secret")
        .await
        .expect("cookie-mode login should succeed");

    assert_eq!(user.role, Role::Customer);
    assert_eq!(ctx.storage.get(storage_keys::SESSION_PRESENT).as_deref(), Some("true"));
    assert_eq!(ctx.navigator.routes(), vec![Route::Home]);

    me.assert_async().await;
}
