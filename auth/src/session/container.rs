//! The per-request session handle.

use std::fmt;
use std::sync::Arc;

use keyward_core::{RequestContext, Result, SessionError};
use serde_json::Value;

use super::cookies;
use super::recipe::SessionInner;

/// A session bound to one verified request.
///
/// Only the session module creates containers, and only from a token that
/// verified or from tokens the core just minted.
#[derive(Clone)]
pub struct SessionContainer {
    user_id: String,
    session_handle: String,
    access_token_payload: Value,
    access_token: String,
    inner: Arc<SessionInner>,
}

impl SessionContainer {
    pub(crate) fn new(
        inner: Arc<SessionInner>,
        session_handle: String,
        user_id: String,
        access_token_payload: Value,
        access_token: String,
    ) -> Self {
        Self {
            user_id,
            session_handle,
            access_token_payload,
            access_token,
            inner,
        }
    }

    /// Owner of the session.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Session family handle.
    #[must_use]
    pub fn session_handle(&self) -> &str {
        &self.session_handle
    }

    /// Payload embedded in the access token.
    #[must_use]
    pub const fn access_token_payload(&self) -> &Value {
        &self.access_token_payload
    }

    /// The raw access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Revoke the whole session family and clear the cookies.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    pub async fn revoke_session(&self, ctx: &mut RequestContext) -> Result<()> {
        let revoked = self
            .inner
            .core
            .revoke_sessions(std::slice::from_ref(&self.session_handle))
            .await?;
        tracing::info!(
            session_handle = %self.session_handle,
            user_id = %self.user_id,
            revoked = revoked.len(),
            "Session revoked"
        );
        cookies::clear_tokens(ctx, &self.inner.settings);
        Ok(())
    }

    /// Data stored with the session in the core service.
    ///
    /// # Errors
    ///
    /// `Unauthorised` if the session no longer exists.
    pub async fn get_session_data(&self) -> Result<Value> {
        self.inner
            .core
            .get_session_information(&self.session_handle)
            .await?
            .map(|info| info.session_data)
            .ok_or_else(|| SessionError::unauthorised("Session does not exist anymore", true).into())
    }

    /// Replace the data stored with the session.
    ///
    /// # Errors
    ///
    /// `Unauthorised` if the session no longer exists.
    pub async fn update_session_data(&self, data: Value) -> Result<()> {
        if self.inner.core.update_session_data(&self.session_handle, data).await? {
            Ok(())
        } else {
            Err(SessionError::unauthorised("Session does not exist anymore", true).into())
        }
    }

    /// Replace the access token payload. Tokens issued from the next refresh
    /// on carry the new payload.
    ///
    /// # Errors
    ///
    /// `Unauthorised` if the session no longer exists.
    pub async fn update_access_token_payload(&mut self, payload: Value) -> Result<()> {
        if self
            .inner
            .core
            .update_access_token_payload(&self.session_handle, payload.clone())
            .await?
        {
            self.access_token_payload = payload;
            Ok(())
        } else {
            Err(SessionError::unauthorised("Session does not exist anymore", true).into())
        }
    }
}

impl fmt::Debug for SessionContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContainer")
            .field("user_id", &self.user_id)
            .field("session_handle", &self.session_handle)
            .field("access_token_payload", &self.access_token_payload)
            .finish_non_exhaustive()
    }
}
