//! Third-party sign-in-or-up through the registry.

#![allow(clippy::expect_used, clippy::panic)] // Test code can use expect/panic

mod common;

use std::sync::Arc;

use common::{app_info, status_of};
use http::{Method, StatusCode};
use keyward_auth::config::SessionConfig;
use keyward_auth::emailverification::{EmailVerificationConfig, EmailVerificationFeature};
use keyward_auth::mocks::{MockCore, MockProvider, RecordingEmailDelivery};
use keyward_auth::providers::ThirdPartyProvider;
use keyward_auth::session::SessionModule;
use keyward_auth::thirdparty::{ThirdPartyConfig, ThirdPartyModule};
use keyward_core::{Error, Registry, RegistryBuilder, RoutableModule, UpstreamError};
use keyward_testing::cookies::SessionTokens;
use keyward_testing::requests::{self, RequestBuilder};
use serde_json::json;

fn google() -> MockProvider {
    MockProvider::new("google")
        .with_user("code-alice", "g-alice", Some(("alice@test.com", true)))
        .with_user("code-bob", "g-bob", Some(("bob@test.com", false)))
        .with_user("code-anon", "g-anon", None)
}

fn registry(core: &MockCore) -> Registry {
    let info = app_info();
    let session = Arc::new(
        SessionModule::new(&info, SessionConfig::new(), Arc::new(core.clone())).expect("session module"),
    );
    let providers: Vec<Arc<dyn ThirdPartyProvider>> = vec![Arc::new(google()), Arc::new(MockProvider::new("github"))];
    let third_party = ThirdPartyModule::new(
        &info,
        ThirdPartyConfig::new(providers).with_email_verification(EmailVerificationFeature::Create {
            core: Arc::new(core.clone()),
            config: EmailVerificationConfig::new().with_delivery(Arc::new(RecordingEmailDelivery::new())),
        }),
        Arc::new(core.clone()),
        session.recipe(),
    )
    .expect("third-party module");

    RegistryBuilder::new(info)
        .with_module(Arc::new(third_party))
        .expect("register third-party")
        .with_module(session as Arc<dyn RoutableModule>)
        .expect("register session")
        .build()
        .expect("registry")
}

fn is_verified(tokens: &SessionTokens) -> keyward_core::RequestContext {
    RequestBuilder::new(Method::GET, "/auth/user/email/verify")
        .with_access_tokens(tokens)
        .build()
}

#[tokio::test]
async fn authorisation_url_comes_from_the_provider() {
    let registry = registry(&MockCore::new());

    let response = registry
        .handle(RequestBuilder::new(Method::GET, "/auth/authorisationurl?thirdPartyId=google").build())
        .await
        .expect("handled");

    assert_eq!(
        response.body,
        Some(json!({
            "status": "OK",
            "url": "https://google.example/authorize?client_id=mock&response_type=code"
        }))
    );
}

#[tokio::test]
async fn authorisation_url_needs_provider_id() {
    let registry = registry(&MockCore::new());

    let result = registry
        .handle(RequestBuilder::new(Method::GET, "/auth/authorisationurl").build())
        .await;

    assert!(matches!(result, Err(Error::BadInput(_))));
}

#[tokio::test]
async fn sign_in_up_creates_then_reuses_the_user() {
    let core = MockCore::new();
    let registry = registry(&core);

    let first = registry
        .handle(requests::third_party_sign_in_up("google", "code-bob", "https://example.com/cb"))
        .await
        .expect("handled");

    assert_eq!(first.status, StatusCode::OK);
    let body = first.body.clone().expect("body");
    assert_eq!(body["status"], "OK");
    assert_eq!(body["createdNewUser"], true);
    assert_eq!(body["user"]["email"], "bob@test.com");
    assert_eq!(body["user"]["thirdParty"], json!({ "id": "google", "userId": "g-bob" }));
    assert_eq!(body["authCodeResponse"]["redirect_uri"], "https://example.com/cb");
    SessionTokens::require_triad(&first.headers).expect("token triad");

    let second = registry
        .handle(requests::third_party_sign_in_up("google", "code-bob", "https://example.com/cb"))
        .await
        .expect("handled");
    let again = second.body.expect("body");
    assert_eq!(again["createdNewUser"], false);
    assert_eq!(again["user"]["id"], body["user"]["id"]);
    assert_eq!(core.session_count().expect("count"), 2);
}

#[tokio::test]
async fn provider_verified_email_is_marked_verified() {
    let registry = registry(&MockCore::new());

    let alice = registry
        .handle(requests::third_party_sign_in_up("google", "code-alice", "https://example.com/cb"))
        .await
        .expect("handled");
    let alice_tokens = SessionTokens::require_triad(&alice.headers).expect("token triad");
    let verified = registry.handle(is_verified(&alice_tokens)).await.expect("handled");
    assert_eq!(verified.body, Some(json!({ "status": "OK", "isVerified": true })));

    let bob = registry
        .handle(requests::third_party_sign_in_up("google", "code-bob", "https://example.com/cb"))
        .await
        .expect("handled");
    let bob_tokens = SessionTokens::require_triad(&bob.headers).expect("token triad");
    let unverified = registry.handle(is_verified(&bob_tokens)).await.expect("handled");
    assert_eq!(unverified.body, Some(json!({ "status": "OK", "isVerified": false })));
}

#[tokio::test]
async fn profile_without_email_is_rejected() {
    let core = MockCore::new();
    let registry = registry(&core);

    let response = registry
        .handle(requests::third_party_sign_in_up("google", "code-anon", "https://example.com/cb"))
        .await
        .expect("handled");

    assert_eq!(status_of(&response), Some("NO_EMAIL_GIVEN_BY_PROVIDER"));
    assert!(SessionTokens::from_headers(&response.headers).expect("headers").access_token.is_none());
    assert_eq!(core.session_count().expect("count"), 0);
}

#[tokio::test]
async fn unknown_provider_is_bad_input() {
    let registry = registry(&MockCore::new());

    let result = registry
        .handle(requests::third_party_sign_in_up("facebook", "code", "https://example.com/cb"))
        .await;

    assert!(matches!(result, Err(Error::BadInput(message)) if message.contains("facebook")));
}

#[tokio::test]
async fn missing_body_fields_are_bad_input() {
    let registry = registry(&MockCore::new());

    let result = registry
        .handle(
            RequestBuilder::new(Method::POST, "/auth/signinup")
                .json(json!({ "thirdPartyId": "google", "code": "code-bob" }))
                .build(),
        )
        .await;

    assert!(matches!(result, Err(Error::BadInput(message)) if message.contains("redirectURI")));
}

#[tokio::test]
async fn rejected_code_surfaces_upstream_error() {
    let registry = registry(&MockCore::new());

    let result = registry
        .handle(requests::third_party_sign_in_up("github", "expired", "https://example.com/cb"))
        .await;

    assert!(matches!(
        result,
        Err(Error::Upstream(UpstreamError::Status { status: 400, .. }))
    ));
}
