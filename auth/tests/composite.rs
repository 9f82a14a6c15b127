//! The third-party + email-password composite: shared email verification,
//! combined overrides and disabled routes.

#![allow(clippy::expect_used, clippy::panic)] // Test code can use expect/panic

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{app_info, permissive_fields, status_of};
use http::{Method, StatusCode};
use keyward_auth::config::SessionConfig;
use keyward_auth::constants::route_ids;
use keyward_auth::emailverification::EmailVerificationConfig;
use keyward_auth::mocks::{MockCore, MockProvider, RecordingEmailDelivery};
use keyward_auth::providers::{
    CreateResetTokenResult, ProviderEmail, ResetPasswordResult, SignInResult, SignInUpResult,
    SignUpResult, ThirdPartyProvider, User,
};
use keyward_auth::session::SessionModule;
use keyward_auth::thirdpartyemailpassword::{
    ThirdPartyEmailPasswordConfig, ThirdPartyEmailPasswordModule, ThirdPartyEmailPasswordRecipe,
};
use keyward_core::{OverrideConfig, Registry, RegistryBuilder, Result, RoutableModule};
use keyward_testing::cookies::SessionTokens;
use keyward_testing::requests::{self, RequestBuilder};
use serde_json::json;

/// Counts sign-in calls and delegates everything to the default.
struct CountingSignIn {
    base: Arc<dyn ThirdPartyEmailPasswordRecipe>,
    sign_ins: Arc<AtomicUsize>,
}

#[async_trait]
impl ThirdPartyEmailPasswordRecipe for CountingSignIn {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        self.base.sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        self.base.sign_in(email, password).await
    }

    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult> {
        self.base.sign_in_up(third_party_id, third_party_user_id, email).await
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.base.get_user_by_id(user_id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.base.get_user_by_email(email).await
    }

    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>> {
        self.base
            .get_user_by_third_party_info(third_party_id, third_party_user_id)
            .await
    }

    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult> {
        self.base.create_reset_password_token(user_id).await
    }

    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult> {
        self.base.reset_password_using_token(token, new_password).await
    }
}

struct CompositeApp {
    registry: Registry,
    module: Arc<ThirdPartyEmailPasswordModule>,
    emails: RecordingEmailDelivery,
}

fn composite(config: ThirdPartyEmailPasswordConfig) -> CompositeApp {
    let info = app_info();
    let core = MockCore::new();
    let emails = RecordingEmailDelivery::new();
    let session = Arc::new(
        SessionModule::new(&info, SessionConfig::new(), Arc::new(core.clone())).expect("session module"),
    );
    let module = Arc::new(
        ThirdPartyEmailPasswordModule::new(
            &info,
            config
                .with_sign_up_fields(permissive_fields())
                .with_delivery(Arc::new(emails.clone()))
                .with_email_verification(EmailVerificationConfig::new().with_delivery(Arc::new(emails.clone()))),
            Arc::new(core),
            session.recipe(),
        )
        .expect("composite module"),
    );

    let registry = RegistryBuilder::new(info)
        .with_module(Arc::clone(&module) as Arc<dyn RoutableModule>)
        .expect("register composite")
        .with_module(session as Arc<dyn RoutableModule>)
        .expect("register session")
        .build()
        .expect("registry");

    CompositeApp {
        registry,
        module,
        emails,
    }
}

fn providers() -> Vec<Arc<dyn ThirdPartyProvider>> {
    vec![Arc::new(
        MockProvider::new("google").with_user("code-bob", "g-bob", Some(("bob@test.com", false))),
    )]
}

#[tokio::test]
async fn combined_override_is_seen_through_the_email_password_route() {
    let sign_ins = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sign_ins);
    let app = composite(
        ThirdPartyEmailPasswordConfig::new().with_overrides(OverrideConfig::new().with_functions(move |base| {
            Arc::new(CountingSignIn {
                base,
                sign_ins: Arc::clone(&counter),
            }) as Arc<dyn ThirdPartyEmailPasswordRecipe>
        })),
    );

    let signed_up = app
        .registry
        .handle(requests::sign_up("e1@test.com", "pw1"))
        .await
        .expect("handled");
    assert_eq!(status_of(&signed_up), Some("OK"));
    assert_eq!(sign_ins.load(Ordering::SeqCst), 0);

    let signed_in = app
        .registry
        .handle(requests::sign_in("e1@test.com", "pw1"))
        .await
        .expect("handled");
    assert_eq!(status_of(&signed_in), Some("OK"));
    assert_eq!(sign_ins.load(Ordering::SeqCst), 1);

    // The module hands out the overridden behavior too.
    let direct = app.module.recipe().sign_in("e1@test.com", "pw1").await.expect("sign in");
    assert!(matches!(direct, SignInResult::Ok(_)));
    assert_eq!(sign_ins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn children_are_composed_in_order() {
    let app = composite(ThirdPartyEmailPasswordConfig::new().with_providers(providers()));

    let ids: Vec<&str> = app.module.children().iter().map(|child| child.id()).collect();
    assert_eq!(ids, vec!["emailpassword", "thirdparty", "emailverification"]);

    let without_providers = composite(ThirdPartyEmailPasswordConfig::new());
    let ids: Vec<&str> = without_providers
        .module
        .children()
        .iter()
        .map(|child| child.id())
        .collect();
    assert_eq!(ids, vec!["emailpassword", "emailverification"]);

    let missing = without_providers
        .registry
        .handle(RequestBuilder::new(Method::GET, "/auth/authorisationurl?thirdPartyId=google").build())
        .await
        .expect("handled");
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn both_sign_in_styles_share_one_email_verification() {
    let app = composite(ThirdPartyEmailPasswordConfig::new().with_providers(providers()));

    let password_user = app
        .registry
        .handle(requests::sign_up("alice@test.com", "pw1"))
        .await
        .expect("handled");
    let alice = SessionTokens::require_triad(&password_user.headers).expect("token triad");

    let social_user = app
        .registry
        .handle(requests::third_party_sign_in_up("google", "code-bob", "https://example.com/cb"))
        .await
        .expect("handled");
    assert_eq!(status_of(&social_user), Some("OK"));
    let bob = SessionTokens::require_triad(&social_user.headers).expect("token triad");

    for tokens in [&alice, &bob] {
        let generated = app
            .registry
            .handle(requests::email_verify_token(tokens))
            .await
            .expect("handled");
        assert_eq!(status_of(&generated), Some("OK"));
    }

    let recipients: Vec<String> = app
        .emails
        .sent()
        .expect("sent")
        .into_iter()
        .map(|email| email.to)
        .collect();
    assert_eq!(recipients, vec!["alice@test.com", "bob@test.com"]);

    let token = app
        .emails
        .last_token_for("bob@test.com")
        .expect("lock")
        .expect("token in link");
    let verified = app
        .registry
        .handle(requests::verify_email(&token))
        .await
        .expect("handled");
    assert_eq!(verified.body.as_ref().expect("body")["user"]["email"], "bob@test.com");

    let alice_user = app
        .module
        .recipe()
        .get_user_by_email("alice@test.com")
        .await
        .expect("lookup")
        .expect("alice exists");
    assert!(alice_user.third_party.is_none());
    assert!(
        !app.module
            .email_verification()
            .recipe()
            .is_email_verified(&alice_user.id, "alice@test.com")
            .await
            .expect("is verified")
    );
}

#[tokio::test]
async fn disabled_route_is_not_served() {
    let app = composite(
        ThirdPartyEmailPasswordConfig::new()
            .with_providers(providers())
            .with_overrides(
                OverrideConfig::new()
                    .disable_api(route_ids::SIGN_UP)
                    .disable_api(route_ids::SIGN_IN_UP),
            ),
    );

    let sign_up = app
        .registry
        .handle(requests::sign_up("e1@test.com", "pw1"))
        .await
        .expect("handled");
    assert_eq!(sign_up.status, StatusCode::NOT_FOUND);

    let sign_in_up = app
        .registry
        .handle(requests::third_party_sign_in_up("google", "code-bob", "https://example.com/cb"))
        .await
        .expect("handled");
    assert_eq!(sign_in_up.status, StatusCode::NOT_FOUND);

    // Other routes are unaffected.
    let sign_in = app
        .registry
        .handle(requests::sign_in("e1@test.com", "pw1"))
        .await
        .expect("handled");
    assert_eq!(status_of(&sign_in), Some("WRONG_CREDENTIALS_ERROR"));

    let url = app
        .registry
        .handle(RequestBuilder::new(Method::GET, "/auth/authorisationurl?thirdPartyId=google").build())
        .await
        .expect("handled");
    assert_eq!(status_of(&url), Some("OK"));
}

#[tokio::test]
async fn field_errors_are_reported_by_the_composite() {
    let app = composite(ThirdPartyEmailPasswordConfig::new());

    let response = app
        .registry
        .handle(
            RequestBuilder::new(Method::POST, "/auth/signup")
                .json(json!({
                    "formFields": [
                        { "id": "email", "value": "nope" },
                        { "id": "password", "value": "" }
                    ]
                }))
                .build(),
        )
        .await
        .expect("handled");

    assert_eq!(
        response.body,
        Some(json!({
            "status": "FIELD_ERROR",
            "formFields": [
                { "id": "password", "error": "Field is not optional" },
                { "id": "email", "error": "Email is invalid" }
            ]
        }))
    );
}
