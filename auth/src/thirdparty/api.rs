//! Third-party HTTP handlers.

use async_trait::async_trait;
use keyward_core::{AppInfo, RequestContext, Result};
use serde_json::{Value, json};

use super::recipe::ThirdPartyRecipe;
use crate::emailverification::EmailVerificationModule;
use crate::providers::{ProviderEmail, ThirdPartyProvider, User};
use crate::session::{SessionContainer, SessionRecipe};

/// Everything a handler may use.
pub struct ThirdPartyApiOptions<'a> {
    /// The (possibly overridden) behavior.
    pub recipe: &'a dyn ThirdPartyRecipe,
    /// Session behavior.
    pub session: &'a dyn SessionRecipe,
    /// Email verification, when enabled.
    pub email_verification: Option<&'a EmailVerificationModule>,
    /// Normalised app info.
    pub app_info: &'a AppInfo,
}

/// Outcome of `POST /signinup`.
#[derive(Debug)]
pub enum SignInUpResponse {
    /// Signed in (or up).
    Ok {
        /// `true` for a brand new user.
        created_new_user: bool,
        /// The user.
        user: User,
        /// Raw token endpoint response.
        auth_code_response: Value,
        /// The new session.
        session: SessionContainer,
    },
    /// The provider profile carried no email.
    NoEmailGivenByProvider,
}

/// Overridable API handlers of the third-party module.
#[async_trait]
pub trait ThirdPartyApi: Send + Sync {
    /// URL to redirect the browser to.
    ///
    /// # Errors
    ///
    /// Provider failures.
    async fn authorisation_url_get(
        &self,
        provider: &dyn ThirdPartyProvider,
        options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<String>;

    /// Exchange the code, then sign the user in or up.
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
    ) -> Result<SignInUpResponse>;
}

/// Default handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultThirdPartyApi;

#[async_trait]
impl ThirdPartyApi for DefaultThirdPartyApi {
    async fn authorisation_url_get(
        &self,
        provider: &dyn ThirdPartyProvider,
        _options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<String> {
        provider.authorisation_url(ctx)
    }

    async fn sign_in_up_post(
        &self,
        provider: &dyn ThirdPartyProvider,
        code: &str,
        redirect_uri: &str,
        options: &ThirdPartyApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInUpResponse> {
        let auth_code_response = provider.exchange_code(code, redirect_uri).await?;
        let profile = provider.get_profile_info(&auth_code_response).await?;
        let Some(email) = profile.email else {
            tracing::debug!(third_party_id = provider.id(), "Provider gave no email");
            return Ok(SignInUpResponse::NoEmailGivenByProvider);
        };
        let email = ProviderEmail {
            id: email.id,
            is_verified: email.is_verified,
        };

        let result = options.recipe.sign_in_up(provider.id(), &profile.id, &email).await?;

        if email.is_verified {
            if let Some(email_verification) = options.email_verification {
                email_verification.mark_verified(&result.user.id, &email.id).await?;
            }
        }

        let session = options
            .session
            .create_new_session(ctx, &result.user.id, json!({}), json!({}))
            .await?;
        tracing::info!(
            user_id = %result.user.id,
            third_party_id = provider.id(),
            created_new_user = result.created_new_user,
            "Third-party sign in"
        );

        Ok(SignInUpResponse::Ok {
            created_new_user: result.created_new_user,
            user: result.user,
            auth_code_response,
            session,
        })
    }
}
