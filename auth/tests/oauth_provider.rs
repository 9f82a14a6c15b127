//! Generic OAuth 2.0 provider against mock token and profile endpoints.

#![allow(clippy::expect_used, clippy::panic)] // Test code can use expect/panic

use keyward_auth::providers::{OAuth2Provider, ThirdPartyProvider};
use keyward_core::{Error, UpstreamError};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> OAuth2Provider {
    OAuth2Provider::new(
        "github",
        "cid",
        "secret",
        format!("{}/login/oauth/authorize", server.uri()),
        format!("{}/login/oauth/access_token", server.uri()),
        format!("{}/user", server.uri()),
    )
    .with_user_id_field("id")
    .with_email_verified_field(None)
}

#[tokio::test]
async fn exchanges_code_and_reads_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_token",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer gho_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 583_231,
            "email": "octo@test.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let github = provider(&server);
    let tokens = github
        .exchange_code("abc", "https://example.com/cb")
        .await
        .expect("token exchange");
    let profile = github.get_profile_info(&tokens).await.expect("profile");

    assert_eq!(profile.id, "583231");
    let email = profile.email.expect("email");
    assert_eq!(email.id, "octo@test.com");
    assert!(!email.is_verified);
}

#[tokio::test]
async fn rejected_code_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad_verification_code"))
        .mount(&server)
        .await;

    let err = provider(&server)
        .exchange_code("stale", "https://example.com/cb")
        .await
        .expect_err("rejected");

    assert!(matches!(
        err,
        Error::Upstream(UpstreamError::Status { status: 401, ref body, .. }) if body == "bad_verification_code"
    ));
}

#[tokio::test]
async fn profile_without_id_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octo" })))
        .mount(&server)
        .await;

    let err = provider(&server)
        .get_profile_info(&json!({ "access_token": "gho_token" }))
        .await
        .expect_err("no id");

    assert!(matches!(err, Error::Upstream(UpstreamError::Malformed { .. })));
}
