//! Email verification behavior.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::Result;

use crate::providers::{CreateEmailVerificationTokenResult, EmailVerificationCore, VerifyEmailResult};

/// Overridable email verification behavior.
#[async_trait]
pub trait EmailVerificationRecipe: Send + Sync {
    /// Token for the verification link.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn create_email_verification_token(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<CreateEmailVerificationTokenResult>;

    /// Consume a token.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn verify_email_using_token(&self, token: &str) -> Result<VerifyEmailResult>;

    /// Has `email` been verified for `user_id`?
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn is_email_verified(&self, user_id: &str, email: &str) -> Result<bool>;
}

/// Default behavior, backed by the core service.
pub struct DefaultEmailVerificationRecipe {
    core: Arc<dyn EmailVerificationCore>,
}

impl DefaultEmailVerificationRecipe {
    /// Recipe over `core`.
    #[must_use]
    pub fn new(core: Arc<dyn EmailVerificationCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl EmailVerificationRecipe for DefaultEmailVerificationRecipe {
    async fn create_email_verification_token(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<CreateEmailVerificationTokenResult> {
        self.core.create_email_verification_token(user_id, email).await
    }

    async fn verify_email_using_token(&self, token: &str) -> Result<VerifyEmailResult> {
        self.core.verify_email_using_token(token).await
    }

    async fn is_email_verified(&self, user_id: &str, email: &str) -> Result<bool> {
        self.core.is_email_verified(user_id, email).await
    }
}

/// Where email verification learns a user's address.
#[async_trait]
pub trait UserEmailLookup: Send + Sync {
    /// Email of `user_id`, `None` for unknown users.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn email_for_user_id(&self, user_id: &str) -> Result<Option<String>>;
}
