//! Combined third-party + email-password behavior.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::Result;

use crate::emailverification::UserEmailLookup;
use crate::providers::{
    CreateResetTokenResult, EmailPasswordCore, ProviderEmail, ResetPasswordResult, SignInResult,
    SignInUpResult, SignUpResult, ThirdPartyCore, User,
};

/// Overridable combined behavior. Both children run on it, so overriding
/// an operation here changes it for whichever child serves the request.
#[async_trait]
pub trait ThirdPartyEmailPasswordRecipe: Send + Sync {
    /// Create an email-password user.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult>;

    /// Check email-password credentials.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult>;

    /// Find or create a third-party user.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult>;

    /// Any user by id.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Email-password user by email.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Third-party user by provider identity.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>>;

    /// Reset token for an email-password user.
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
pub struct DefaultThirdPartyEmailPasswordRecipe {
    email_password: Arc<dyn EmailPasswordCore>,
    third_party: Arc<dyn ThirdPartyCore>,
}

impl DefaultThirdPartyEmailPasswordRecipe {
    /// Recipe over both cores.
    #[must_use]
    pub fn new(email_password: Arc<dyn EmailPasswordCore>, third_party: Arc<dyn ThirdPartyCore>) -> Self {
        Self {
            email_password,
            third_party,
        }
    }
}

#[async_trait]
impl ThirdPartyEmailPasswordRecipe for DefaultThirdPartyEmailPasswordRecipe {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        self.email_password.sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult> {
        self.email_password.sign_in(email, password).await
    }

    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult> {
        self.third_party
            .sign_in_up(third_party_id, third_party_user_id, email)
            .await
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        if let Some(user) = self.email_password.get_user_by_id(user_id).await? {
            return Ok(Some(user));
        }
        self.third_party.get_third_party_user_by_id(user_id).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.email_password.get_user_by_email(email).await
    }

    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>> {
        self.third_party
            .get_user_by_third_party_info(third_party_id, third_party_user_id)
            .await
    }

    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult> {
        self.email_password.create_reset_password_token(user_id).await
    }

    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult> {
        self.email_password
            .reset_password_using_token(token, new_password)
            .await
    }
}

/// Email lookup over both kinds of users.
pub struct CombinedEmailLookup(pub Arc<dyn ThirdPartyEmailPasswordRecipe>);

#[async_trait]
impl UserEmailLookup for CombinedEmailLookup {
    async fn email_for_user_id(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.0.get_user_by_id(user_id).await?.map(|user| user.email))
    }
}
