//! Email verification HTTP handlers.

use async_trait::async_trait;
use keyward_core::{AppInfo, Error, RequestContext, Result};

use super::recipe::{EmailVerificationRecipe, UserEmailLookup};
use crate::constants::module_ids;
use crate::providers::{
    AuthEmail, CreateEmailVerificationTokenResult, EmailDelivery, EmailKind, VerifyEmailResult,
};
use crate::session::{SessionRecipe, VerifySessionOptions};

/// Everything a handler may use.
pub struct EmailVerificationApiOptions<'a> {
    /// The (possibly overridden) behavior.
    pub recipe: &'a dyn EmailVerificationRecipe,
    /// Session behavior.
    pub session: &'a dyn SessionRecipe,
    /// Email lookup for session users.
    pub email_lookup: &'a dyn UserEmailLookup,
    /// Delivery of verification links.
    pub delivery: &'a dyn EmailDelivery,
    /// Normalised app info, for building links.
    pub app_info: &'a AppInfo,
}

/// Outcome of `POST /user/email/verify/token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateEmailVerifyTokenResponse {
    /// Link sent.
    Ok,
    /// Nothing to do.
    EmailAlreadyVerified,
}

/// Outcome of `POST /user/email/verify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyEmailResponse {
    /// Email verified.
    Ok {
        /// User id.
        user_id: String,
        /// Verified address.
        email: String,
    },
    /// Token unknown, expired or used.
    InvalidToken,
}

/// Link embedded in the verification email.
#[must_use]
pub fn verification_link(app_info: &AppInfo, token: &str) -> String {
    format!(
        "{}{}/verify-email?token={}&rid={}",
        app_info.website_domain,
        app_info.website_base_path,
        urlencoding::encode(token),
        module_ids::EMAIL_VERIFICATION
    )
}

async fn session_email(
    options: &EmailVerificationApiOptions<'_>,
    ctx: &mut RequestContext,
) -> Result<(String, String)> {
    let session = options
        .session
        .get_session(ctx, &VerifySessionOptions::required())
        .await?
        .ok_or_else(|| Error::Internal("required session came back empty".to_string()))?;
    let user_id = session.user_id().to_string();
    let email = options
        .email_lookup
        .email_for_user_id(&user_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Unknown User ID provided: {user_id}")))?;
    Ok((user_id, email))
}

/// Overridable API handlers of the email verification module.
#[async_trait]
pub trait EmailVerificationApi: Send + Sync {
    /// Send a verification link to the session user.
    ///
    /// # Errors
    ///
    /// Session errors, upstream or delivery failures.
    async fn generate_email_verify_token_post(
        &self,
        options: &EmailVerificationApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<GenerateEmailVerifyTokenResponse>;

    /// Consume a verification token.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn verify_email_post(
        &self,
        token: &str,
        options: &EmailVerificationApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<VerifyEmailResponse>;

    /// Is the session user's email verified?
    ///
    /// # Errors
    ///
    /// Session errors, upstream failures.
    async fn is_email_verified_get(
        &self,
        options: &EmailVerificationApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<bool>;
}

/// Default handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEmailVerificationApi;

#[async_trait]
impl EmailVerificationApi for DefaultEmailVerificationApi {
    async fn generate_email_verify_token_post(
        &self,
        options: &EmailVerificationApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<GenerateEmailVerifyTokenResponse> {
        let (user_id, email) = session_email(options, ctx).await?;
        match options
            .recipe
            .create_email_verification_token(&user_id, &email)
            .await?
        {
            CreateEmailVerificationTokenResult::EmailAlreadyVerified => {
                Ok(GenerateEmailVerifyTokenResponse::EmailAlreadyVerified)
            }
            CreateEmailVerificationTokenResult::Ok(token) => {
                let link = verification_link(options.app_info, &token);
                options
                    .delivery
                    .send(&AuthEmail {
                        to: email,
                        user_id,
                        kind: EmailKind::EmailVerification { link },
                    })
                    .await?;
                Ok(GenerateEmailVerifyTokenResponse::Ok)
            }
        }
    }

    async fn verify_email_post(
        &self,
        token: &str,
        options: &EmailVerificationApiOptions<'_>,
        _ctx: &mut RequestContext,
    ) -> Result<VerifyEmailResponse> {
        Ok(match options.recipe.verify_email_using_token(token).await? {
            VerifyEmailResult::Ok { user_id, email } => {
                tracing::info!(user_id = %user_id, "Email verified");
                VerifyEmailResponse::Ok { user_id, email }
            }
            VerifyEmailResult::InvalidToken => VerifyEmailResponse::InvalidToken,
        })
    }

    async fn is_email_verified_get(
        &self,
        options: &EmailVerificationApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<bool> {
        let (user_id, email) = session_email(options, ctx).await?;
        options.recipe.is_email_verified(&user_id, &email).await
    }
}
