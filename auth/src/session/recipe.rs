//! Session behavior: issue, verify, refresh and revoke.

use std::sync::Arc;

use async_trait::async_trait;
use constant_time_eq::constant_time_eq;
use http::Method;
use keyward_core::{Clock, RequestContext, Result, SessionError};
use serde_json::Value;
use tokio::sync::RwLock;

use super::access_token::{self, AccessTokenPayload};
use super::container::SessionContainer;
use super::cookies;
use crate::config::{AntiCsrf, SessionSettings};
use crate::constants::{cookies as cookie_names, headers};
use crate::providers::{CreatedSession, SessionCore, SessionInformation, SigningKey};
use crate::utils::to_millis;

/// Options for [`SessionRecipe::get_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifySessionOptions {
    /// Fail with `Unauthorised` instead of returning `None` when the request
    /// carries no session.
    pub session_required: bool,

    /// Force (`Some(true)`) or skip (`Some(false)`) the anti-CSRF check.
    /// `None` checks every method except `GET`.
    pub anti_csrf_check: Option<bool>,

    /// Also ask the core whether the session still exists.
    pub check_database: bool,
}

impl VerifySessionOptions {
    /// Session must exist; default anti-CSRF policy.
    #[must_use]
    pub const fn required() -> Self {
        Self {
            session_required: true,
            anti_csrf_check: None,
            check_database: false,
        }
    }

    /// Session may be absent.
    #[must_use]
    pub const fn optional() -> Self {
        Self {
            session_required: false,
            anti_csrf_check: None,
            check_database: false,
        }
    }

    /// Set the anti-CSRF policy.
    #[must_use]
    pub const fn with_anti_csrf_check(mut self, check: bool) -> Self {
        self.anti_csrf_check = Some(check);
        self
    }

    /// Also verify against the core.
    #[must_use]
    pub const fn with_check_database(mut self) -> Self {
        self.check_database = true;
        self
    }
}

impl Default for VerifySessionOptions {
    fn default() -> Self {
        Self::required()
    }
}

/// Overridable session behavior.
#[async_trait]
pub trait SessionRecipe: Send + Sync {
    /// Mint a new session for `user_id` and write its tokens to the response.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn create_new_session(
        &self,
        ctx: &mut RequestContext,
        user_id: &str,
        access_token_payload: Value,
        session_data: Value,
    ) -> Result<SessionContainer>;

    /// Validate the session carried by the request.
    ///
    /// # Errors
    ///
    /// `Unauthorised` when no session is present and one is required,
    /// `TryRefreshToken` when the access token is missing, invalid, expired
    /// or fails the anti-CSRF check.
    async fn get_session(
        &self,
        ctx: &mut RequestContext,
        options: &VerifySessionOptions,
    ) -> Result<Option<SessionContainer>>;

    /// Rotate the refresh token carried by the request.
    ///
    /// # Errors
    ///
    /// `Unauthorised` or `TokenTheftDetected`.
    async fn refresh_session(&self, ctx: &mut RequestContext) -> Result<SessionContainer>;

    /// Revoke one session family. `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn revoke_session(&self, session_handle: &str) -> Result<bool>;

    /// Revoke every session of a user; returns the revoked handles.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<Vec<String>>;

    /// Server-side view of a session.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_session_information(&self, session_handle: &str) -> Result<Option<SessionInformation>>;

    /// Replace session data. `false` if the session does not exist.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn update_session_data(&self, session_handle: &str, data: Value) -> Result<bool>;

    /// Replace the access token payload. `false` if the session does not exist.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn update_access_token_payload(&self, session_handle: &str, payload: Value) -> Result<bool>;
}

/// State shared by the default recipe and every container it hands out.
pub(crate) struct SessionInner {
    pub(crate) core: Arc<dyn SessionCore>,
    pub(crate) settings: SessionSettings,
    pub(crate) clock: Arc<dyn Clock>,
    signing_key: RwLock<Option<SigningKey>>,
}

impl SessionInner {
    pub(crate) fn new(core: Arc<dyn SessionCore>, settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            core,
            settings,
            clock,
            signing_key: RwLock::new(None),
        }
    }

    async fn signing_key(&self, refetch: bool) -> Result<SigningKey> {
        if !refetch {
            if let Some(key) = self.signing_key.read().await.clone() {
                return Ok(key);
            }
        }
        let key = self.core.signing_key().await?;
        *self.signing_key.write().await = Some(key.clone());
        Ok(key)
    }

    /// Verify with the cached key; on failure refetch the key once, since
    /// the core may have rotated it.
    async fn verify_access_token(&self, token: &str) -> Result<AccessTokenPayload> {
        let key = self.signing_key(false).await?;
        match access_token::verify(token, &key) {
            Ok(payload) => Ok(payload),
            Err(first) => {
                tracing::debug!(error = %first, "Access token did not verify, refetching signing key");
                let key = self.signing_key(true).await?;
                access_token::verify(token, &key)
                    .map_err(|e| SessionError::try_refresh(e.to_string()).into())
            }
        }
    }

    fn check_anti_csrf(&self, ctx: &RequestContext, payload: &AccessTokenPayload) -> Result<()> {
        match self.settings.anti_csrf {
            AntiCsrf::ViaToken => {
                let sent = ctx.header(headers::ANTI_CSRF);
                let expected = payload.anti_csrf_token.as_deref();
                match (sent, expected) {
                    (Some(sent), Some(expected)) if constant_time_eq(sent.as_bytes(), expected.as_bytes()) => Ok(()),
                    _ => Err(SessionError::try_refresh("anti-csrf check failed").into()),
                }
            }
            AntiCsrf::ViaCustomHeader => {
                if ctx.header(headers::RID).is_some() {
                    Ok(())
                } else {
                    Err(SessionError::try_refresh(
                        "anti-csrf check failed. Please pass the 'rid' header in the request",
                    )
                    .into())
                }
            }
            AntiCsrf::None => Ok(()),
        }
    }

    fn container(self: &Arc<Self>, created: &CreatedSession) -> SessionContainer {
        SessionContainer::new(
            Arc::clone(self),
            created.session.handle.clone(),
            created.session.user_id.clone(),
            created.session.user_data_in_jwt.clone(),
            created.access_token.token.clone(),
        )
    }
}

/// Default behavior, backed by the core service.
pub struct DefaultSessionRecipe {
    inner: Arc<SessionInner>,
}

impl DefaultSessionRecipe {
    pub(crate) const fn new(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SessionRecipe for DefaultSessionRecipe {
    async fn create_new_session(
        &self,
        ctx: &mut RequestContext,
        user_id: &str,
        access_token_payload: Value,
        session_data: Value,
    ) -> Result<SessionContainer> {
        let enable_anti_csrf = self.inner.settings.anti_csrf == AntiCsrf::ViaToken;
        let created = self
            .inner
            .core
            .create_session(user_id, access_token_payload, session_data, enable_anti_csrf)
            .await?;

        cookies::attach_tokens(ctx, &self.inner.settings, &created);
        tracing::info!(
            user_id,
            session_handle = %created.session.handle,
            "Session created"
        );
        Ok(self.inner.container(&created))
    }

    async fn get_session(
        &self,
        ctx: &mut RequestContext,
        options: &VerifySessionOptions,
    ) -> Result<Option<SessionContainer>> {
        if ctx.cookie(cookie_names::ID_REFRESH_TOKEN).is_none() {
            if options.session_required {
                return Err(SessionError::unauthorised(
                    "Session does not exist. Are you sending the session tokens in the request as cookies?",
                    false,
                )
                .into());
            }
            return Ok(None);
        }

        let Some(access_token) = ctx.cookie(cookie_names::ACCESS_TOKEN).map(str::to_string) else {
            return Err(SessionError::try_refresh("Access token missing. Please call the refresh API").into());
        };

        let payload = self.inner.verify_access_token(&access_token).await?;

        let now = to_millis(self.inner.clock.now());
        let skew = self.inner.settings.clock_skew.num_milliseconds();
        if payload.expiry_time.saturating_add(skew) < now {
            tracing::debug!(session_handle = %payload.session_handle, "Access token expired");
            return Err(SessionError::try_refresh("Access token has expired. Please call the refresh API").into());
        }

        let do_anti_csrf_check = options
            .anti_csrf_check
            .unwrap_or_else(|| *ctx.method() != Method::GET);
        if do_anti_csrf_check {
            self.inner.check_anti_csrf(ctx, &payload)?;
        }

        // A token minted by a refresh still names its parent refresh token
        // until the core swaps it for one that does not.
        let mut access_token = access_token;
        if options.check_database || payload.parent_refresh_token_hash1.is_some() {
            let verified = self.inner.core.verify_session(&access_token, None, false).await?;
            if let Some(replacement) = verified.access_token {
                cookies::attach_access_token(
                    ctx,
                    &self.inner.settings,
                    &replacement,
                    &payload.user_id,
                    &payload.user_data,
                );
                tracing::debug!(session_handle = %payload.session_handle, "Access token replaced");
                access_token = replacement.token;
            }
        }

        Ok(Some(SessionContainer::new(
            Arc::clone(&self.inner),
            payload.session_handle,
            payload.user_id,
            payload.user_data,
            access_token,
        )))
    }

    async fn refresh_session(&self, ctx: &mut RequestContext) -> Result<SessionContainer> {
        let Some(refresh_token) = ctx.cookie(cookie_names::REFRESH_TOKEN).map(str::to_string) else {
            return Err(SessionError::unauthorised(
                "Refresh token not found. Are you sending the refresh token in the request as a cookie?",
                false,
            )
            .into());
        };

        if self.inner.settings.anti_csrf == AntiCsrf::ViaCustomHeader && ctx.header(headers::RID).is_none() {
            return Err(SessionError::unauthorised(
                "anti-csrf check failed. Please pass the 'rid' header in the request",
                false,
            )
            .into());
        }

        let anti_csrf = ctx.header(headers::ANTI_CSRF).map(str::to_string);
        let enable_anti_csrf = self.inner.settings.anti_csrf == AntiCsrf::ViaToken;
        let created = self
            .inner
            .core
            .refresh_session(&refresh_token, anti_csrf.as_deref(), enable_anti_csrf)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "Session refresh rejected"))?;

        cookies::attach_tokens(ctx, &self.inner.settings, &created);
        tracing::debug!(session_handle = %created.session.handle, "Session refreshed");
        Ok(self.inner.container(&created))
    }

    async fn revoke_session(&self, session_handle: &str) -> Result<bool> {
        let revoked = self
            .inner
            .core
            .revoke_sessions(&[session_handle.to_string()])
            .await?;
        Ok(!revoked.is_empty())
    }

    async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        self.inner.core.revoke_all_sessions_for_user(user_id).await
    }

    async fn get_session_information(&self, session_handle: &str) -> Result<Option<SessionInformation>> {
        self.inner.core.get_session_information(session_handle).await
    }

    async fn update_session_data(&self, session_handle: &str, data: Value) -> Result<bool> {
        self.inner.core.update_session_data(session_handle, data).await
    }

    async fn update_access_token_payload(&self, session_handle: &str, payload: Value) -> Result<bool> {
        self.inner
            .core
            .update_access_token_payload(session_handle, payload)
            .await
    }
}
