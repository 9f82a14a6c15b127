//! Turning session errors into responses.

use async_trait::async_trait;
use http::StatusCode;
use keyward_core::{Reply, RequestContext, Result};

use super::recipe::SessionRecipe;

/// Responses for the three session error kinds.
///
/// Cookies have already been cleared (when the error asks for it) by the
/// time a handler runs.
#[async_trait]
pub trait SessionErrorHandler: Send + Sync {
    /// No usable session.
    ///
    /// # Errors
    ///
    /// A new error replaces the original one.
    async fn on_unauthorised(&self, message: &str, ctx: &mut RequestContext) -> Result<Reply>;

    /// The client should call the refresh endpoint.
    ///
    /// # Errors
    ///
    /// A new error replaces the original one.
    async fn on_try_refresh_token(&self, message: &str, ctx: &mut RequestContext) -> Result<Reply>;

    /// A rotated refresh token was replayed.
    ///
    /// # Errors
    ///
    /// A new error replaces the original one.
    async fn on_token_theft_detected(
        &self,
        session_handle: &str,
        user_id: &str,
        recipe: &dyn SessionRecipe,
        ctx: &mut RequestContext,
    ) -> Result<Reply>;
}

/// `{"message": ...}` bodies with a configurable status.
#[derive(Debug, Clone, Copy)]
pub struct DefaultSessionErrorHandler {
    status: StatusCode,
}

impl DefaultSessionErrorHandler {
    /// Respond with `status` (normally 401).
    #[must_use]
    pub const fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

impl Default for DefaultSessionErrorHandler {
    fn default() -> Self {
        Self::new(StatusCode::UNAUTHORIZED)
    }
}

#[async_trait]
impl SessionErrorHandler for DefaultSessionErrorHandler {
    async fn on_unauthorised(&self, _message: &str, _ctx: &mut RequestContext) -> Result<Reply> {
        Ok(Reply::message(self.status, "unauthorised"))
    }

    async fn on_try_refresh_token(&self, _message: &str, _ctx: &mut RequestContext) -> Result<Reply> {
        Ok(Reply::message(self.status, "try refresh token"))
    }

    async fn on_token_theft_detected(
        &self,
        session_handle: &str,
        user_id: &str,
        recipe: &dyn SessionRecipe,
        _ctx: &mut RequestContext,
    ) -> Result<Reply> {
        tracing::warn!(session_handle, user_id, "Token theft detected, revoking session");
        recipe.revoke_session(session_handle).await?;
        Ok(Reply::message(self.status, "token theft detected"))
    }
}
