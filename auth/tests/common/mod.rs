//! Shared wiring for the integration tests.

#![allow(dead_code, clippy::expect_used)]

use std::sync::Arc;

use keyward_auth::config::SessionConfig;
use keyward_auth::emailpassword::{EmailPasswordConfig, EmailPasswordModule, FormFieldConfig};
use keyward_auth::emailverification::{EmailVerificationConfig, EmailVerificationFeature};
use keyward_auth::mocks::{MockCore, RecordingEmailDelivery};
use keyward_auth::session::SessionModule;
use keyward_core::{AppInfo, AuthResponse, Registry, RegistryBuilder, RequestContext};
use keyward_testing::cookies::SessionTokens;

pub fn app_info() -> AppInfo {
    AppInfo::new("Keyward Test", "https://api.example.com", "https://example.com")
}

/// Password field that accepts anything, so tests can use short passwords.
pub fn permissive_fields() -> Vec<FormFieldConfig> {
    vec![FormFieldConfig::new("password").with_validator(|_| None)]
}

/// Email-password (with its own email verification) plus session.
pub struct EmailPasswordApp {
    pub registry: Registry,
    pub core: MockCore,
    pub session: Arc<SessionModule>,
    pub emails: RecordingEmailDelivery,
}

impl EmailPasswordApp {
    pub fn new(core: MockCore, session_config: SessionConfig) -> Self {
        let info = app_info();
        let emails = RecordingEmailDelivery::new();
        let session = Arc::new(
            SessionModule::new(&info, session_config, Arc::new(core.clone())).expect("session module"),
        );
        let email_password = EmailPasswordModule::new(
            &info,
            EmailPasswordConfig::new()
                .with_sign_up_fields(permissive_fields())
                .with_delivery(Arc::new(emails.clone()))
                .with_email_verification(EmailVerificationFeature::Create {
                    core: Arc::new(core.clone()),
                    config: EmailVerificationConfig::new().with_delivery(Arc::new(emails.clone())),
                }),
            Arc::new(core.clone()),
            session.recipe(),
        )
        .expect("email-password module");

        let registry = RegistryBuilder::new(info)
            .with_module(Arc::new(email_password))
            .expect("register email-password")
            .with_module(Arc::clone(&session) as Arc<dyn keyward_core::RoutableModule>)
            .expect("register session")
            .build()
            .expect("registry");

        Self {
            registry,
            core,
            session,
            emails,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MockCore::new(), SessionConfig::new())
    }

    pub async fn send(&self, ctx: RequestContext) -> AuthResponse {
        self.registry.handle(ctx).await.expect("request handled")
    }

    /// Sign up and return the issued tokens.
    pub async fn signed_up(&self, email: &str, password: &str) -> SessionTokens {
        let response = self.send(keyward_testing::requests::sign_up(email, password)).await;
        assert_eq!(response.status, http::StatusCode::OK);
        SessionTokens::require_triad(&response.headers).expect("token triad")
    }
}

pub fn status_of(response: &AuthResponse) -> Option<&str> {
    response
        .body
        .as_ref()
        .and_then(|body| body.get("status"))
        .and_then(serde_json::Value::as_str)
}

pub fn message_of(response: &AuthResponse) -> Option<&str> {
    response
        .body
        .as_ref()
        .and_then(|body| body.get("message"))
        .and_then(serde_json::Value::as_str)
}
