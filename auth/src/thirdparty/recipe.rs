//! Third-party sign-in behavior.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::Result;

use crate::emailverification::UserEmailLookup;
use crate::providers::{ProviderEmail, SignInUpResult, ThirdPartyCore, User};

/// Overridable third-party behavior.
#[async_trait]
pub trait ThirdPartyRecipe: Send + Sync {
    /// Look up a third-party user by id.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Look up a user by provider identity.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>>;

    /// Find or create the user for a provider identity.
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
}

/// Default behavior, backed by the core service.
pub struct DefaultThirdPartyRecipe {
    core: Arc<dyn ThirdPartyCore>,
}

impl DefaultThirdPartyRecipe {
    /// Recipe over `core`.
    #[must_use]
    pub fn new(core: Arc<dyn ThirdPartyCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ThirdPartyRecipe for DefaultThirdPartyRecipe {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        self.core.get_third_party_user_by_id(user_id).await
    }

    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>> {
        self.core
            .get_user_by_third_party_info(third_party_id, third_party_user_id)
            .await
    }

    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult> {
        self.core.sign_in_up(third_party_id, third_party_user_id, email).await
    }
}

/// Email lookup through the (possibly overridden) third-party behavior.
pub struct ThirdPartyEmailLookup(pub Arc<dyn ThirdPartyRecipe>);

#[async_trait]
impl UserEmailLookup for ThirdPartyEmailLookup {
    async fn email_for_user_id(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self.0.get_user_by_id(user_id).await?.map(|user| user.email))
    }
}
