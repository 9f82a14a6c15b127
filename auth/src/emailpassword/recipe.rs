//! Email + password behavior.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::Result;

use crate::emailverification::UserEmailLookup;
use crate::providers::{
    CreateResetTokenResult, EmailPasswordCore, ResetPasswordResult, SignInResult, SignUpResult, User,
};

/// Overridable email + password behavior.
#[async_trait]
pub trait EmailPasswordRecipe: Send + Sync {
    /// Create a user.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult>;

    /// Check credentials.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult>;

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Look up a user by email.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Token for a password reset link.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult>;

    /// Consume a reset token.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult>;
}

/// Default behavior, backed by the core service.
pub struct DefaultEmailPasswordRecipe {
    core: Arc<dyn EmailPasswordCore>,
}

impl DefaultEmailPasswordRecipe {
    /// Recipe over `core`.
    #[must_use]
    pub fn new(core: Arc<dyn EmailPasswordCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl EmailPasswordRecipe for DefaultEmailPasswordRecipe {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        self.core.sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult> {
        self.core.sign_in(email, password).await
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.core.get_user_by_id(user_id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.core.get_user_by_email(email).await
    }

    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult> {
        self.core.create_reset_password_token(user_id).await
    }

    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult> {
        self.core.reset_password_using_token(token, new_password).await
    }
}

/// Email lookup through the (possibly overridden) email-password behavior.
pub struct EmailPasswordEmailLookup(pub Arc<dyn EmailPasswordRecipe>);

#[async_trait]
impl UserEmailLookup for EmailPasswordEmailLookup {
    async fn email_for_user_id(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.0.get_user_by_id(user_id).await?.map(|user| user.email))
    }
}
