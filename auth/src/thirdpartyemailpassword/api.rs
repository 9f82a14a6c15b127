//! Combined third-party + email-password handlers.

use async_trait::async_trait;
use keyward_core::{RequestContext, Result};

use crate::emailpassword::{
    DefaultEmailPasswordApi, EmailPasswordApi, EmailPasswordApiOptions, FormField, PasswordResetResponse,
    SignInResponse, SignUpResponse,
};
use crate::providers::ThirdPartyProvider;
use crate::thirdparty::{DefaultThirdPartyApi, SignInUpResponse, ThirdPartyApi, ThirdPartyApiOptions};

/// Overridable combined handlers. The defaults are the plain
/// email-password and third-party handlers.
#[async_trait]
pub trait ThirdPartyEmailPasswordApi: Send + Sync {
    /// See [`EmailPasswordApi::email_exists_get`].
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn email_exists_get(
        &self,
        email: &str,
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<bool> {
        DefaultEmailPasswordApi.email_exists_get(email, options, ctx).await
    }

    /// See [`EmailPasswordApi::generate_password_reset_token_post`].
    ///
    /// # Errors
    ///
    /// Upstream or delivery failures.
    async fn generate_password_reset_token_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<()> {
        DefaultEmailPasswordApi
            .generate_password_reset_token_post(form_fields, options, ctx)
            .await
    }

    /// See [`EmailPasswordApi::password_reset_post`].
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn password_reset_post(
        &self,
        form_fields: &[FormField],
        token: &str,
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<PasswordResetResponse> {
        DefaultEmailPasswordApi
            .password_reset_post(form_fields, token, options, ctx)
            .await
    }

    /// See [`EmailPasswordApi::sign_in_post`].
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInResponse> {
        DefaultEmailPasswordApi.sign_in_post(form_fields, options, ctx).await
    }

    /// See [`EmailPasswordApi::sign_up_post`].
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_up_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignUpResponse> {
        DefaultEmailPasswordApi.sign_up_post(form_fields, options, ctx).await
    }

    /// See [`ThirdPartyApi::authorisation_url_get`].
    ///
    /// # Errors
    ///
    /// Provider failures.
    async fn authorisation_url_get(
        &self,
        provider: &dyn ThirdPartyProvider,
        options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<String> {
        DefaultThirdPartyApi.authorisation_url_get(provider, options, ctx).await
    }

    /// See [`ThirdPartyApi::sign_in_up_post`].
    ///
    /// # Errors
    ///
    /// Provider or upstream failures.
    async fn sign_in_up_post(
        &self,
        provider: &dyn ThirdPartyProvider,
        code: &str,
        redirect_uri: &str,
        options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInUpResponse> {
        DefaultThirdPartyApi
            .sign_in_up_post(provider, code, redirect_uri, options, ctx)
            .await
    }
}

/// Default combined handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultThirdPartyEmailPasswordApi;

#[async_trait]
impl ThirdPartyEmailPasswordApi for DefaultThirdPartyEmailPasswordApi {}
