//! Session HTTP handlers.

use async_trait::async_trait;
use keyward_core::{Error, Reply, RequestContext, Result, SessionError};
use serde_json::json;

use super::container::SessionContainer;
use super::recipe::{SessionRecipe, VerifySessionOptions};
use crate::constants::status;

/// Overridable API handlers of the session module.
#[async_trait]
pub trait SessionApi: Send + Sync {
    /// `POST /session/refresh`
    ///
    /// # Errors
    ///
    /// Session errors from the refresh.
    async fn refresh_post(&self, recipe: &dyn SessionRecipe, ctx: &mut RequestContext) -> Result<Reply>;

    /// `POST /signout`
    ///
    /// # Errors
    ///
    /// Session errors other than "no session", upstream failures.
    async fn sign_out_post(&self, recipe: &dyn SessionRecipe, ctx: &mut RequestContext) -> Result<Reply>;

    /// Guard used by application routes and by other modules.
    ///
    /// # Errors
    ///
    /// As [`SessionRecipe::get_session`].
    async fn verify_session(
        &self,
        recipe: &dyn SessionRecipe,
        ctx: &mut RequestContext,
        options: &VerifySessionOptions,
    ) -> Result<Option<SessionContainer>> {
        recipe.get_session(ctx, options).await
    }
}

/// Default handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSessionApi;

#[async_trait]
impl SessionApi for DefaultSessionApi {
    async fn refresh_post(&self, recipe: &dyn SessionRecipe, ctx: &mut RequestContext) -> Result<Reply> {
        recipe.refresh_session(ctx).await?;
        Ok(Reply::empty())
    }

    async fn sign_out_post(&self, recipe: &dyn SessionRecipe, ctx: &mut RequestContext) -> Result<Reply> {
        let session = match recipe.get_session(ctx, &VerifySessionOptions::required()).await {
            Ok(session) => session,
            // Nothing to sign out of.
            Err(Error::Session(SessionError::Unauthorised { .. })) => {
                return Ok(Reply::json(json!({ "status": status::OK })));
            }
            Err(e) => return Err(e),
        };

        if let Some(session) = session {
            session.revoke_session(ctx).await?;
        }
        Ok(Reply::json(json!({ "status": status::OK })))
    }
}
