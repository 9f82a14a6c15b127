//! Present the combined behavior and handlers as the per-child traits.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::{RequestContext, Result};

use super::api::ThirdPartyEmailPasswordApi;
use super::recipe::ThirdPartyEmailPasswordRecipe;
use crate::emailpassword::{
    EmailPasswordApi, EmailPasswordApiOptions, EmailPasswordRecipe, FormField, PasswordResetResponse,
    SignInResponse, SignUpResponse,
};
use crate::providers::{
    CreateResetTokenResult, ProviderEmail, ResetPasswordResult, SignInResult, SignInUpResult,
    SignUpResult, ThirdPartyProvider, User,
};
use crate::thirdparty::{SignInUpResponse, ThirdPartyApi, ThirdPartyApiOptions, ThirdPartyRecipe};

/// Email-password view of the combined behavior. Only email-password users
/// are visible.
pub struct EmailPasswordRecipeAdapter(pub Arc<dyn ThirdPartyEmailPasswordRecipe>);

#[async_trait]
impl EmailPasswordRecipe for EmailPasswordRecipeAdapter {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        self.0.sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult> {
        self.0.sign_in(email, password).await
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .0
            .get_user_by_id(user_id)
            .await?
            .filter(|user| user.third_party.is_none()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.0.get_user_by_email(email).await
    }

    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult> {
        self.0.create_reset_password_token(user_id).await
    }

    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult> {
        self.0.reset_password_using_token(token, new_password).await
    }
}

/// Third-party view of the combined behavior. Only third-party users are
/// visible.
pub struct ThirdPartyRecipeAdapter(pub Arc<dyn ThirdPartyEmailPasswordRecipe>);

#[async_trait]
impl ThirdPartyRecipe for ThirdPartyRecipeAdapter {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .0
            .get_user_by_id(user_id)
            .await?
            .filter(|user| user.third_party.is_some()))
    }

    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>> {
        self.0
            .get_user_by_third_party_info(third_party_id, third_party_user_id)
            .await
    }

    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult> {
        self.0.sign_in_up(third_party_id, third_party_user_id, email).await
    }
}

/// Email-password view of the combined handlers.
pub struct EmailPasswordApiAdapter(pub Arc<dyn ThirdPartyEmailPasswordApi>);

#[async_trait]
impl EmailPasswordApi for EmailPasswordApiAdapter {
    async fn email_exists_get(
        &self,
        email: &str,
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<bool> {
        self.0.email_exists_get(email, options, ctx).await
    }

    async fn generate_password_reset_token_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<()> {
        self.0
            .generate_password_reset_token_post(form_fields, options, ctx)
            .await
    }

    async fn password_reset_post(
        &self,
        form_fields: &[FormField],
        token: &str,
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<PasswordResetResponse> {
        self.0.password_reset_post(form_fields, token, options, ctx).await
    }

    async fn sign_in_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInResponse> {
        self.0.sign_in_post(form_fields, options, ctx).await
    }

    async fn sign_up_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignUpResponse> {
        self.0.sign_up_post(form_fields, options, ctx).await
    }
}

/// Third-party view of the combined handlers.
pub struct ThirdPartyApiAdapter(pub Arc<dyn ThirdPartyEmailPasswordApi>);

#[async_trait]
impl ThirdPartyApi for ThirdPartyApiAdapter {
    async fn authorisation_url_get(
        &self,
        provider: &dyn ThirdPartyProvider,
        options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<String> {
        self.0.authorisation_url_get(provider, options, ctx).await
    }

    async fn sign_in_up_post(
        &self,
        provider: &dyn ThirdPartyProvider,
        code: &str,
        redirect_uri: &str,
        options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInUpResponse> {
        self.0
            .sign_in_up_post(provider, code, redirect_uri, options, ctx)
            .await
    }
}
