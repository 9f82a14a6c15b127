//! Session token lifecycle: refresh rotation, theft detection, expiry,
//! anti-CSRF and revocation.

#![allow(clippy::expect_used, clippy::panic)] // Test code can use expect/panic

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Duration;
use common::{EmailPasswordApp, message_of, status_of};
use http::{Method, StatusCode};
use keyward_auth::config::{AntiCsrf, SessionConfig};
use async_trait::async_trait;
use keyward_auth::mocks::MockCore;
use keyward_auth::providers::{CreatedSession, SessionCore, SessionInformation, SigningKey, VerifiedAccess};
use keyward_auth::session::{SessionModule, VerifySessionOptions};
use keyward_core::{Error, Reply, RequestContext, SessionError};
use keyward_testing::cookies::{SessionTokens, parse_response_cookies};
use keyward_testing::mocks::ManualClock;
use keyward_testing::requests::{self, RequestBuilder};
use serde_json::{Value, json};

fn protected_post(tokens: &SessionTokens) -> keyward_core::RequestContext {
    RequestBuilder::new(Method::POST, "/api/orders")
        .rid("session")
        .with_access_tokens(tokens)
        .build()
}

#[tokio::test]
async fn refresh_rotates_the_token_triad() {
    let app = EmailPasswordApp::with_defaults();
    let first = app.signed_up("e1@test.com", "pw1").await;

    let response = app.send(requests::refresh(&first)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_none());
    let second = SessionTokens::require_triad(&response.headers).expect("token triad");
    assert_ne!(first.access_token, second.access_token);
    assert_ne!(first.refresh_token, second.refresh_token);

    // The rotated access token still verifies.
    let mut ctx = protected_post(&second);
    let session = app
        .session
        .verify_session(&mut ctx, &VerifySessionOptions::required())
        .await
        .expect("verify")
        .expect("session present");
    assert_eq!(app.core.session_count().expect("count"), 1);
    assert!(!session.session_handle().is_empty());
}

/// Mock core that counts server-side access token checks.
struct CountingCore {
    inner: MockCore,
    verifies: AtomicUsize,
}

#[async_trait]
impl SessionCore for CountingCore {
    async fn create_session(
        &self,
        user_id: &str,
        access_token_payload: Value,
        session_data: Value,
        enable_anti_csrf: bool,
    ) -> keyward_core::Result<CreatedSession> {
        self.inner
            .create_session(user_id, access_token_payload, session_data, enable_anti_csrf)
            .await
    }

    async fn verify_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
    ) -> keyward_core::Result<VerifiedAccess> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner
            .verify_session(access_token, anti_csrf_token, do_anti_csrf_check)
            .await
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
    ) -> keyward_core::Result<CreatedSession> {
        self.inner
            .refresh_session(refresh_token, anti_csrf_token, enable_anti_csrf)
            .await
    }

    async fn revoke_sessions(&self, session_handles: &[String]) -> keyward_core::Result<Vec<String>> {
        self.inner.revoke_sessions(session_handles).await
    }

    async fn revoke_all_sessions_for_user(&self, user_id: &str) -> keyward_core::Result<Vec<String>> {
        self.inner.revoke_all_sessions_for_user(user_id).await
    }

    async fn get_session_information(&self, session_handle: &str) -> keyward_core::Result<Option<SessionInformation>> {
        self.inner.get_session_information(session_handle).await
    }

    async fn update_session_data(&self, session_handle: &str, data: Value) -> keyward_core::Result<bool> {
        self.inner.update_session_data(session_handle, data).await
    }

    async fn update_access_token_payload(&self, session_handle: &str, payload: Value) -> keyward_core::Result<bool> {
        self.inner.update_access_token_payload(session_handle, payload).await
    }

    async fn signing_key(&self) -> keyward_core::Result<SigningKey> {
        self.inner.signing_key().await
    }
}

#[tokio::test]
async fn first_verify_after_refresh_replaces_the_access_token() {
    let core = Arc::new(CountingCore {
        inner: MockCore::new(),
        verifies: AtomicUsize::new(0),
    });
    let session = SessionModule::new(
        &common::app_info(),
        SessionConfig::new(),
        Arc::clone(&core) as Arc<dyn SessionCore>,
    )
    .expect("session module");
    let recipe = session.recipe();

    let mut ctx = RequestBuilder::new(Method::POST, "/auth/signin").build();
    recipe
        .create_new_session(&mut ctx, "u1", json!({ "role": "admin" }), json!({}))
        .await
        .expect("created");
    let first = SessionTokens::require_triad(&ctx.into_response(Reply::empty()).headers).expect("token triad");

    let mut ctx = requests::refresh(&first);
    recipe.refresh_session(&mut ctx).await.expect("refreshed");
    let rotated = SessionTokens::require_triad(&ctx.into_response(Reply::empty()).headers).expect("token triad");

    let mut ctx = protected_post(&rotated);
    session
        .verify_session(&mut ctx, &VerifySessionOptions::required())
        .await
        .expect("verify")
        .expect("session present");
    assert_eq!(core.verifies.load(Ordering::SeqCst), 1);
    let response = ctx.into_response(Reply::empty());
    let cookies = parse_response_cookies(&response.headers).expect("cookies");
    assert_eq!(cookies.len(), 1);
    let confirmed = cookies["sAccessToken"].value.clone();
    assert_ne!(Some(&confirmed), rotated.access_token.as_ref());
    assert!(response.headers.contains_key("front-token"));

    let confirmed_tokens = SessionTokens {
        access_token: Some(confirmed),
        ..rotated
    };
    for _ in 0..5 {
        let mut ctx = protected_post(&confirmed_tokens);
        let verified = session
            .verify_session(&mut ctx, &VerifySessionOptions::required())
            .await
            .expect("verify")
            .expect("session present");
        assert_eq!(verified.user_id(), "u1");
        let response = ctx.into_response(Reply::empty());
        assert!(parse_response_cookies(&response.headers).expect("cookies").is_empty());
    }
    assert_eq!(core.verifies.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replayed_refresh_token_is_treated_as_theft() {
    keyward_testing::helpers::init_tracing();
    let app = EmailPasswordApp::with_defaults();
    let first = app.signed_up("e1@test.com", "pw1").await;
    let rotated = app.send(requests::refresh(&first)).await;
    let second = SessionTokens::require_triad(&rotated.headers).expect("token triad");

    let replay = app.send(requests::refresh(&first)).await;

    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(message_of(&replay), Some("token theft detected"));
    let cookies = parse_response_cookies(&replay.headers).expect("cookies");
    assert!(cookies["sAccessToken"].is_removal());
    assert!(cookies["sRefreshToken"].is_removal());
    assert!(cookies["sIdRefreshToken"].is_removal());
    assert_eq!(app.core.session_count().expect("count"), 0);

    // The legitimate holder is logged out too.
    let after = app.send(requests::refresh(&second)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);
    assert_eq!(message_of(&after), Some("unauthorised"));
}

#[tokio::test]
async fn concurrent_refreshes_have_one_winner() {
    let app = EmailPasswordApp::with_defaults();
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let (a, b) = tokio::join!(
        app.send(requests::refresh(&tokens)),
        app.send(requests::refresh(&tokens)),
    );

    let winners = [&a, &b]
        .iter()
        .filter(|response| response.status == StatusCode::OK)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn expired_access_token_asks_for_refresh() {
    let clock = ManualClock::starting_at_test_epoch();
    let core = MockCore::new()
        .with_clock(Arc::new(clock.clone()))
        .with_access_token_validity(Duration::minutes(10));
    let app = EmailPasswordApp::new(core, SessionConfig::new().with_clock(Arc::new(clock.clone())));
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let mut fresh = protected_post(&tokens);
    assert!(
        app.session
            .verify_session(&mut fresh, &VerifySessionOptions::required())
            .await
            .is_ok()
    );

    clock.advance(Duration::minutes(11));

    let mut stale = protected_post(&tokens);
    let err = app
        .session
        .verify_session(&mut stale, &VerifySessionOptions::required())
        .await
        .expect_err("expired token must not verify");
    assert!(matches!(err, Error::Session(SessionError::TryRefreshToken { .. })));

    let response = app.registry.handle_error(err, stale).await.expect("handled");
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(message_of(&response), Some("try refresh token"));

    // The refresh token outlives the access token.
    let refreshed = app.send(requests::refresh(&tokens)).await;
    assert_eq!(refreshed.status, StatusCode::OK);
}

#[tokio::test]
async fn clock_skew_tolerates_recent_expiry() {
    let clock = ManualClock::starting_at_test_epoch();
    let core = MockCore::new()
        .with_clock(Arc::new(clock.clone()))
        .with_access_token_validity(Duration::minutes(10));
    let app = EmailPasswordApp::new(
        core,
        SessionConfig::new()
            .with_clock(Arc::new(clock.clone()))
            .with_clock_skew(Duration::minutes(2)),
    );
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    clock.advance(Duration::minutes(11));

    let mut ctx = protected_post(&tokens);
    assert!(
        app.session
            .verify_session(&mut ctx, &VerifySessionOptions::required())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn anti_csrf_token_is_enforced() {
    let app = EmailPasswordApp::new(MockCore::new(), SessionConfig::new().with_anti_csrf(AntiCsrf::ViaToken));
    let tokens = app.signed_up("e1@test.com", "pw1").await;
    assert!(tokens.anti_csrf.is_some());

    let mut good = protected_post(&tokens);
    assert!(
        app.session
            .verify_session(&mut good, &VerifySessionOptions::required())
            .await
            .is_ok()
    );

    let forged = SessionTokens {
        anti_csrf: Some("forged".to_string()),
        ..tokens.clone()
    };
    let mut bad = protected_post(&forged);
    let err = app
        .session
        .verify_session(&mut bad, &VerifySessionOptions::required())
        .await
        .expect_err("forged anti-csrf token");
    assert!(matches!(err, Error::Session(SessionError::TryRefreshToken { .. })));

    // GET requests skip the check unless asked.
    let mut get = RequestBuilder::new(Method::GET, "/api/orders")
        .with_access_tokens(&forged)
        .build();
    assert!(
        app.session
            .verify_session(&mut get, &VerifySessionOptions::required())
            .await
            .is_ok()
    );
    let mut checked_get = RequestBuilder::new(Method::GET, "/api/orders")
        .with_access_tokens(&forged)
        .build();
    assert!(
        app.session
            .verify_session(
                &mut checked_get,
                &VerifySessionOptions::required().with_anti_csrf_check(true)
            )
            .await
            .is_err()
    );

    let refresh = app.send(requests::refresh(&forged)).await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
    assert_eq!(message_of(&refresh), Some("unauthorised"));
    assert_eq!(app.core.session_count().expect("count"), 1);
}

#[tokio::test]
async fn custom_header_mode_requires_rid_on_refresh() {
    let app = EmailPasswordApp::new(
        MockCore::new(),
        SessionConfig::new().with_anti_csrf(AntiCsrf::ViaCustomHeader),
    );
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let without_rid = app
        .send(
            RequestBuilder::new(Method::POST, "/auth/session/refresh")
                .with_refresh_tokens(&tokens)
                .build(),
        )
        .await;
    assert_eq!(without_rid.status, StatusCode::UNAUTHORIZED);

    let with_rid = app.send(requests::refresh(&tokens)).await;
    assert_eq!(with_rid.status, StatusCode::OK);
}

#[tokio::test]
async fn missing_tokens_are_reported() {
    let app = EmailPasswordApp::with_defaults();
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    // No cookies at all.
    let mut anonymous = RequestBuilder::new(Method::POST, "/api/orders").rid("session").build();
    let err = app
        .session
        .verify_session(&mut anonymous, &VerifySessionOptions::required())
        .await
        .expect_err("no session");
    assert!(matches!(
        err,
        Error::Session(SessionError::Unauthorised { clear_cookies: false, .. })
    ));

    let mut optional = RequestBuilder::new(Method::POST, "/api/orders").rid("session").build();
    let none = app
        .session
        .verify_session(&mut optional, &VerifySessionOptions::optional())
        .await
        .expect("optional session");
    assert!(none.is_none());

    // Id-refresh cookie present, access token missing.
    let only_id = SessionTokens {
        access_token: None,
        ..tokens.clone()
    };
    let mut ctx = protected_post(&only_id);
    let err = app
        .session
        .verify_session(&mut ctx, &VerifySessionOptions::optional())
        .await
        .expect_err("access token missing");
    assert!(matches!(err, Error::Session(SessionError::TryRefreshToken { .. })));

    let no_refresh = SessionTokens {
        refresh_token: None,
        ..tokens
    };
    let response = app.send(requests::refresh(&no_refresh)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(parse_response_cookies(&response.headers).expect("cookies").is_empty());
}

#[tokio::test]
async fn sign_out_clears_cookies_and_revokes() {
    let app = EmailPasswordApp::with_defaults();
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let response = app.send(requests::sign_out(&tokens)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(status_of(&response), Some("OK"));
    let cookies = parse_response_cookies(&response.headers).expect("cookies");
    assert!(cookies.values().all(|c| c.is_removal()));
    assert_eq!(app.core.session_count().expect("count"), 0);

    let refresh = app.send(requests::refresh(&tokens)).await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);

    // Signing out without a session still succeeds.
    let again = app
        .send(RequestBuilder::new(Method::POST, "/auth/signout").rid("session").build())
        .await;
    assert_eq!(status_of(&again), Some("OK"));
}

#[tokio::test]
async fn rotated_signing_key_forces_refresh() {
    let app = EmailPasswordApp::with_defaults();
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let mut before = protected_post(&tokens);
    assert!(
        app.session
            .verify_session(&mut before, &VerifySessionOptions::required())
            .await
            .is_ok()
    );

    app.core.rotate_signing_key().expect("rotate");

    let mut stale = protected_post(&tokens);
    let err = app
        .session
        .verify_session(&mut stale, &VerifySessionOptions::required())
        .await
        .expect_err("old signature");
    assert!(matches!(err, Error::Session(SessionError::TryRefreshToken { .. })));

    let refreshed = app.send(requests::refresh(&tokens)).await;
    let new_tokens = SessionTokens::require_triad(&refreshed.headers).expect("token triad");
    let mut ctx = protected_post(&new_tokens);
    assert!(
        app.session
            .verify_session(&mut ctx, &VerifySessionOptions::required())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn database_check_notices_revocation() {
    let app = EmailPasswordApp::with_defaults();
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let mut ctx = protected_post(&tokens);
    let session = app
        .session
        .verify_session(&mut ctx, &VerifySessionOptions::required())
        .await
        .expect("verify")
        .expect("session present");
    assert!(
        app.session
            .recipe()
            .revoke_session(session.session_handle())
            .await
            .expect("revoke")
    );

    // Stateless verification still accepts the token until it expires.
    let mut stateless = protected_post(&tokens);
    assert!(
        app.session
            .verify_session(&mut stateless, &VerifySessionOptions::required())
            .await
            .is_ok()
    );

    let mut checked = protected_post(&tokens);
    let err = app
        .session
        .verify_session(&mut checked, &VerifySessionOptions::required().with_check_database())
        .await
        .expect_err("revoked");
    assert!(matches!(
        err,
        Error::Session(SessionError::Unauthorised { clear_cookies: true, .. })
    ));
}

#[tokio::test]
async fn session_container_reads_and_updates_state() {
    let app = EmailPasswordApp::with_defaults();
    let tokens = app.signed_up("e1@test.com", "pw1").await;

    let mut ctx = protected_post(&tokens);
    let mut session = app
        .session
        .verify_session(&mut ctx, &VerifySessionOptions::required())
        .await
        .expect("verify")
        .expect("session present");

    assert_eq!(session.access_token().to_string(), tokens.access_token.clone().expect("token"));
    assert_eq!(session.get_session_data().await.expect("data"), json!({}));
    session
        .update_session_data(json!({ "cart": 3 }))
        .await
        .expect("update data");
    assert_eq!(session.get_session_data().await.expect("data"), json!({ "cart": 3 }));

    session
        .update_access_token_payload(json!({ "role": "admin" }))
        .await
        .expect("update payload");
    assert_eq!(session.access_token_payload(), &json!({ "role": "admin" }));

    // The next rotation carries the new payload.
    let refreshed = app.send(requests::refresh(&tokens)).await;
    let new_tokens = SessionTokens::require_triad(&refreshed.headers).expect("token triad");
    let mut ctx = protected_post(&new_tokens);
    let rotated = app
        .session
        .verify_session(&mut ctx, &VerifySessionOptions::required())
        .await
        .expect("verify")
        .expect("session present");
    assert_eq!(rotated.access_token_payload(), &json!({ "role": "admin" }));
    assert_eq!(rotated.user_id(), session.user_id());

    let mut signout_ctx = protected_post(&new_tokens);
    rotated.revoke_session(&mut signout_ctx).await.expect("revoke");
    assert_eq!(app.core.session_count().expect("count"), 0);
    assert!(session.get_session_data().await.is_err());
}

#[tokio::test]
async fn custom_expired_status_code_is_used() {
    let app = EmailPasswordApp::new(
        MockCore::new(),
        SessionConfig::new().with_session_expired_status_code(StatusCode::from_u16(440).expect("status")),
    );

    let response = app
        .send(RequestBuilder::new(Method::POST, "/auth/session/refresh").rid("session").build())
        .await;

    assert_eq!(response.status.as_u16(), 440);
}

#[tokio::test]
async fn revoking_every_session_of_a_user() {
    let app = EmailPasswordApp::with_defaults();
    let first = app.signed_up("e1@test.com", "pw1").await;
    let signed_in = app.send(requests::sign_in("e1@test.com", "pw1")).await;
    let second = SessionTokens::require_triad(&signed_in.headers).expect("token triad");
    assert_eq!(app.core.session_count().expect("count"), 2);

    let mut ctx = protected_post(&first);
    let session = app
        .session
        .verify_session(&mut ctx, &VerifySessionOptions::required())
        .await
        .expect("verify")
        .expect("session present");
    let recipe = app.session.recipe();
    let info = recipe
        .get_session_information(session.session_handle())
        .await
        .expect("lookup")
        .expect("session exists");
    assert_eq!(info.user_id, session.user_id());

    let revoked = recipe
        .revoke_all_sessions_for_user(session.user_id())
        .await
        .expect("revoke all");
    assert_eq!(revoked.len(), 2);
    assert!(
        recipe
            .get_session_information(session.session_handle())
            .await
            .expect("lookup")
            .is_none()
    );

    let refresh = app.send(requests::refresh(&second)).await;
    assert_eq!(refresh.status, StatusCode::UNAUTHORIZED);
}
