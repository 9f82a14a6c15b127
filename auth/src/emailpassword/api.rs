//! Email + password HTTP handlers.

use async_trait::async_trait;
use keyward_core::{AppInfo, RequestContext, Result};
use serde_json::json;

use super::form::{self, FormField};
use super::recipe::EmailPasswordRecipe;
use crate::constants::module_ids;
use crate::emailverification::EmailVerificationModule;
use crate::providers::{
    AuthEmail, CreateResetTokenResult, EmailDelivery, EmailKind, ResetPasswordResult, SignInResult,
    SignUpResult, User,
};
use crate::session::{SessionContainer, SessionRecipe};

/// Everything a handler may use.
pub struct EmailPasswordApiOptions<'a> {
    /// The (possibly overridden) behavior.
    pub recipe: &'a dyn EmailPasswordRecipe,
    /// Session behavior.
    pub session: &'a dyn SessionRecipe,
    /// Email verification, when enabled.
    pub email_verification: Option<&'a EmailVerificationModule>,
    /// Delivery of reset links.
    pub delivery: &'a dyn EmailDelivery,
    /// Normalised app info, for building links.
    pub app_info: &'a AppInfo,
}

/// Outcome of `POST /signup`.
#[derive(Debug)]
pub enum SignUpResponse {
    /// User created and signed in.
    Ok {
        /// The new user.
        user: User,
        /// Their first session.
        session: SessionContainer,
    },
    /// Email taken.
    EmailAlreadyExists,
}

/// Outcome of `POST /signin`.
#[derive(Debug)]
pub enum SignInResponse {
    /// Signed in.
    Ok {
        /// The user.
        user: User,
        /// The new session.
        session: SessionContainer,
    },
    /// Unknown email or wrong password.
    WrongCredentials,
}

/// Outcome of `POST /user/password/reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordResetResponse {
    /// Password changed.
    Ok {
        /// Owner of the token, when the core reports it.
        user_id: Option<String>,
    },
    /// Token unknown, expired or used.
    InvalidToken,
}

/// Link embedded in the password reset email.
#[must_use]
pub fn reset_password_link(app_info: &AppInfo, token: &str) -> String {
    format!(
        "{}{}/reset-password?token={}&rid={}",
        app_info.website_domain,
        app_info.website_base_path,
        urlencoding::encode(token),
        module_ids::EMAIL_PASSWORD
    )
}

/// Overridable API handlers of the email-password module.
///
/// Form fields arrive already validated.
#[async_trait]
pub trait EmailPasswordApi: Send + Sync {
    /// Is `email` taken?
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn email_exists_get(
        &self,
        email: &str,
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<bool>;

    /// Email a reset link. Always succeeds for unknown emails.
    ///
    /// # Errors
    ///
    /// Upstream or delivery failures.
    async fn generate_password_reset_token_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<()>;

    /// Set a new password with a reset token.
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
    ) -> Result<PasswordResetResponse>;

    /// Check credentials and start a session.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInResponse>;

    /// Create a user and start a session.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_up_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignUpResponse>;
}

/// Default handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEmailPasswordApi;

#[async_trait]
impl EmailPasswordApi for DefaultEmailPasswordApi {
    async fn email_exists_get(
        &self,
        email: &str,
        options: &EmailPasswordApiOptions<'_>,
        _ctx: &mut RequestContext,
    ) -> Result<bool> {
        Ok(options.recipe.get_user_by_email(email).await?.is_some())
    }

    async fn generate_password_reset_token_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        _ctx: &mut RequestContext,
    ) -> Result<()> {
        let email = form::value_of(form_fields, form::EMAIL);
        let Some(user) = options.recipe.get_user_by_email(email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };
        let token = match options.recipe.create_reset_password_token(&user.id).await? {
            CreateResetTokenResult::Ok(token) => token,
            CreateResetTokenResult::UnknownUserId => return Ok(()),
        };

        options
            .delivery
            .send(&AuthEmail {
                to: user.email,
                user_id: user.id,
                kind: EmailKind::PasswordReset {
                    link: reset_password_link(options.app_info, &token),
                },
            })
            .await
    }

    async fn password_reset_post(
        &self,
        form_fields: &[FormField],
        token: &str,
        options: &EmailPasswordApiOptions<'_>,
        _ctx: &mut RequestContext,
    ) -> Result<PasswordResetResponse> {
        let password = form::value_of(form_fields, form::PASSWORD);
        Ok(match options.recipe.reset_password_using_token(token, password).await? {
            ResetPasswordResult::Ok(user_id) => {
                tracing::info!(user_id = ?user_id, "Password reset");
                PasswordResetResponse::Ok { user_id }
            }
            ResetPasswordResult::InvalidToken => PasswordResetResponse::InvalidToken,
        })
    }

    async fn sign_in_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignInResponse> {
        let email = form::value_of(form_fields, form::EMAIL);
        let password = form::value_of(form_fields, form::PASSWORD);
        match options.recipe.sign_in(email, password).await? {
            SignInResult::WrongCredentials => {
                tracing::debug!("Sign in failed: wrong credentials");
                Ok(SignInResponse::WrongCredentials)
            }
            SignInResult::Ok(user) => {
                let session = options
                    .session
                    .create_new_session(ctx, &user.id, json!({}), json!({}))
                    .await?;
                tracing::info!(user_id = %user.id, session_handle = %session.session_handle(), "Signed in");
                Ok(SignInResponse::Ok { user, session })
            }
        }
    }

    async fn sign_up_post(
        &self,
        form_fields: &[FormField],
        options: &EmailPasswordApiOptions<'_>,
        ctx: &mut RequestContext,
    ) -> Result<SignUpResponse> {
        let email = form::value_of(form_fields, form::EMAIL);
        let password = form::value_of(form_fields, form::PASSWORD);
        match options.recipe.sign_up(email, password).await? {
            SignUpResult::EmailAlreadyExists => Ok(SignUpResponse::EmailAlreadyExists),
            SignUpResult::Ok(user) => {
                let session = options
                    .session
                    .create_new_session(ctx, &user.id, json!({}), json!({}))
                    .await?;
                tracing::info!(user_id = %user.id, session_handle = %session.session_handle(), "Signed up");
                Ok(SignUpResponse::Ok { user, session })
            }
        }
    }
}
