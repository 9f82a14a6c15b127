//! The auth middleware and extractors inside a real axum router.

#![allow(clippy::expect_used, clippy::panic)] // Test code can use expect/panic

use std::sync::Arc;

use axum::{
    Json, Router,
    body::{self, Body},
    http::{Request, Response, StatusCode, header},
    routing::get,
};
use keyward_auth::config::SessionConfig;
use keyward_auth::emailpassword::{EmailPasswordConfig, EmailPasswordModule};
use keyward_auth::mocks::MockCore;
use keyward_auth::session::SessionModule;
use keyward_core::{AppInfo, RegistryBuilder, RoutableModule};
use keyward_testing::cookies::SessionTokens;
use keyward_web::{AuthState, CORRELATION_ID_HEADER, OptionalSession, VerifiedSession, with_auth};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn orders(VerifiedSession(session): VerifiedSession) -> Json<Value> {
    Json(json!({ "userId": session.user_id() }))
}

async fn feed(OptionalSession(session): OptionalSession) -> Json<Value> {
    Json(json!({ "signedIn": session.is_some() }))
}

fn app() -> Router {
    let info = AppInfo::new("Keyward Web Test", "https://api.example.com", "https://example.com");
    let core = MockCore::new();
    let session = Arc::new(
        SessionModule::new(&info, SessionConfig::new(), Arc::new(core.clone())).expect("session module"),
    );
    let email_password = EmailPasswordModule::new(
        &info,
        EmailPasswordConfig::new(),
        Arc::new(core),
        session.recipe(),
    )
    .expect("email-password module");
    let registry = RegistryBuilder::new(info)
        .with_module(Arc::new(email_password))
        .expect("register email-password")
        .with_module(Arc::clone(&session) as Arc<dyn RoutableModule>)
        .expect("register session")
        .build()
        .expect("registry");

    let state = AuthState::new(Arc::new(registry), session);
    let routes = Router::new()
        .route("/api/orders", get(orders))
        .route("/api/feed", get(feed))
        .with_state(state.clone());
    with_auth(routes, state).expect("router")
}

fn sign_up_request(email: &str) -> Request<Body> {
    let body = json!({
        "formFields": [
            { "id": "email", "value": email },
            { "id": "password", "value": "validPass123" }
        ]
    });
    Request::builder()
        .method("POST")
        .uri("/auth/signup")
        .header("rid", "emailpassword")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn json_of(response: Response<Body>) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn signed_up(app: &Router, email: &str) -> (SessionTokens, Value) {
    let response = app.clone().oneshot(sign_up_request(email)).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = SessionTokens::require_triad(response.headers()).expect("token triad");
    (tokens, json_of(response).await)
}

#[tokio::test]
async fn sign_up_is_served_by_the_engine() {
    keyward_testing::helpers::init_tracing();
    let app = app();

    let response = app.oneshot(sign_up_request("e1@test.com")).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    assert!(response.headers().contains_key("front-token"));
    SessionTokens::require_triad(response.headers()).expect("token triad");
    let body = json_of(response).await;
    assert_eq!(body["status"], "OK");
    assert_eq!(body["user"]["email"], "e1@test.com");
}

#[tokio::test]
async fn verified_session_reaches_the_handler() {
    let app = app();
    let (tokens, body) = signed_up(&app, "e1@test.com").await;

    let request = Request::builder()
        .uri("/api/orders")
        .header(header::COOKIE, tokens.access_cookie_header().expect("cookie"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_of(response).await["userId"], body["user"]["id"]);
}

#[tokio::test]
async fn missing_session_gets_the_session_error_response() {
    let app = app();

    let request = Request::builder().uri("/api/orders").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(response).await, json!({ "message": "unauthorised" }));
}

#[tokio::test]
async fn garbled_access_token_asks_for_a_refresh() {
    let app = app();

    let request = Request::builder()
        .uri("/api/orders")
        .header(header::COOKIE, "sAccessToken=garbage; sIdRefreshToken=also-garbage")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_of(response).await, json!({ "message": "try refresh token" }));
}

#[tokio::test]
async fn optional_session_allows_anonymous_requests() {
    let app = app();
    let (tokens, _) = signed_up(&app, "e1@test.com").await;

    let anonymous = Request::builder().uri("/api/feed").body(Body::empty()).expect("request");
    let response = app.clone().oneshot(anonymous).await.expect("response");
    assert_eq!(json_of(response).await, json!({ "signedIn": false }));

    let signed_in = Request::builder()
        .uri("/api/feed")
        .header(header::COOKIE, tokens.access_cookie_header().expect("cookie"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(signed_in).await.expect("response");
    assert_eq!(json_of(response).await, json!({ "signedIn": true }));
}

#[tokio::test]
async fn refresh_over_http_rotates_tokens() {
    let app = app();
    let (first, _) = signed_up(&app, "e1@test.com").await;

    let request = Request::builder()
        .method("POST")
        .uri("/auth/session/refresh")
        .header("rid", "session")
        .header(header::COOKIE, first.refresh_cookie_header().expect("cookie"))
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let second = SessionTokens::require_triad(response.headers()).expect("token triad");
    assert_ne!(first.refresh_token, second.refresh_token);
}

#[tokio::test]
async fn unowned_requests_fall_through_to_the_router() {
    let app = app();

    let unknown = Request::builder().uri("/auth/nothing-here").body(Body::empty()).expect("request");
    let response = app.clone().oneshot(unknown).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let wrong_method = Request::builder().uri("/auth/signup").body(Body::empty()).expect("request");
    let response = app.oneshot(wrong_method).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = app();

    let request = Request::builder()
        .method("POST")
        .uri("/auth/signup")
        .header("rid", "emailpassword")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("not json"))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_of(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn preflight_allows_the_website_and_auth_headers() {
    let app = app();

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/auth/signup")
        .header(header::ORIGIN, "https://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "rid,content-type")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");

    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.com");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .expect("ascii");
    assert!(allowed.contains("rid"));
    assert!(allowed.contains("fdi-version"));
}
