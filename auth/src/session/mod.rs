//! Session management module.
//!
//! Issues, verifies, rotates and revokes the session token triad
//! (`sAccessToken`, `sRefreshToken`, `sIdRefreshToken`) and turns session
//! errors into responses for the whole registry.
//!
//! ```text
//! Unauthenticated ──create──► Active ──expiry──► (try refresh)
//!                               ▲                     │
//!                               └──────refresh────────┘
//! Active ──signout / theft──► Revoked
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use keyward_core::{
    AppInfo, Error, ErrorDisposition, Reply, RequestContext, Result, RouteDescriptor, RouteId,
    RoutableModule, SessionError,
};

pub mod access_token;
pub mod api;
pub mod container;
pub mod cookies;
pub mod error_handler;
pub mod recipe;

pub use access_token::AccessTokenPayload;
pub use api::{DefaultSessionApi, SessionApi};
pub use container::SessionContainer;
pub use error_handler::{DefaultSessionErrorHandler, SessionErrorHandler};
pub use recipe::{DefaultSessionRecipe, SessionRecipe, VerifySessionOptions};

use crate::config::{SessionConfig, SessionSettings};
use crate::constants::{headers, module_ids, route_ids};
use crate::providers::SessionCore;
use recipe::SessionInner;

/// The session module.
pub struct SessionModule {
    routes: Vec<RouteDescriptor>,
    settings: SessionSettings,
    recipe: Arc<dyn SessionRecipe>,
    api: Arc<dyn SessionApi>,
    error_handler: Arc<dyn SessionErrorHandler>,
}

impl SessionModule {
    /// Build the module. Overrides in `config` are applied here, once.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info or session settings.
    pub fn new(app_info: &AppInfo, config: SessionConfig, core: Arc<dyn SessionCore>) -> Result<Self> {
        let app_info = app_info.clone().normalised()?;
        let settings = config.settings(&app_info)?;

        let inner = Arc::new(SessionInner::new(core, settings.clone(), Arc::clone(&config.clock)));
        let recipe = config
            .overrides
            .functions
            .apply(Arc::new(DefaultSessionRecipe::new(inner)));
        let api = config.overrides.apis.apply(Arc::new(DefaultSessionApi));
        let error_handler = config.error_handler.clone().unwrap_or_else(|| {
            Arc::new(DefaultSessionErrorHandler::new(settings.session_expired_status_code))
        });

        let route = |id: &'static str, method: Method, path: &str| {
            RouteDescriptor::new(id, method, path)
                .with_disabled(config.overrides.is_disabled(&RouteId::from_static(id)))
        };
        let routes = vec![
            route(route_ids::SESSION_REFRESH, Method::POST, "/session/refresh"),
            route(route_ids::SESSION_SIGNOUT, Method::POST, "/signout"),
        ];

        tracing::debug!(
            anti_csrf = settings.anti_csrf.as_str(),
            refresh_path = %settings.refresh_token_path,
            "Session module configured"
        );

        Ok(Self {
            routes,
            settings,
            recipe,
            api,
            error_handler,
        })
    }

    /// The (possibly overridden) behavior, for other modules and the
    /// application.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn SessionRecipe> {
        Arc::clone(&self.recipe)
    }

    /// Resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Verify the session of an application request.
    ///
    /// # Errors
    ///
    /// Session errors; feed them to `Registry::handle_error` to get the
    /// standard responses.
    pub async fn verify_session(
        &self,
        ctx: &mut RequestContext,
        options: &VerifySessionOptions,
    ) -> Result<Option<SessionContainer>> {
        self.api.verify_session(self.recipe.as_ref(), ctx, options).await
    }

    async fn on_session_error(&self, err: SessionError, ctx: &mut RequestContext) -> Result<Reply> {
        match err {
            SessionError::Unauthorised { message, clear_cookies } => {
                tracing::debug!(clear_cookies, "Unauthorised: {}", message);
                if clear_cookies {
                    cookies::clear_tokens(ctx, &self.settings);
                }
                self.error_handler.on_unauthorised(&message, ctx).await
            }
            SessionError::TryRefreshToken { message } => {
                tracing::debug!("Try refresh token: {}", message);
                self.error_handler.on_try_refresh_token(&message, ctx).await
            }
            SessionError::TokenTheftDetected { session_handle, user_id } => {
                cookies::clear_tokens(ctx, &self.settings);
                self.error_handler
                    .on_token_theft_detected(&session_handle, &user_id, self.recipe.as_ref(), ctx)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for SessionModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionModule")
            .field("routes", &self.routes)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for SessionModule {
    fn id(&self) -> &str {
        module_ids::SESSION
    }

    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    fn cors_headers(&self) -> Vec<String> {
        vec![headers::ANTI_CSRF.to_string(), headers::RID.to_string()]
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        tracing::debug!(route_id = %route_id, module = module_ids::SESSION, "Handling request");
        match route_id.as_str() {
            route_ids::SESSION_REFRESH => self.api.refresh_post(self.recipe.as_ref(), ctx).await,
            route_ids::SESSION_SIGNOUT => self.api.sign_out_post(self.recipe.as_ref(), ctx).await,
            other => Err(Error::Internal(format!("session module has no route `{other}`"))),
        }
    }

    async fn handle_error(&self, err: Error, ctx: &mut RequestContext) -> ErrorDisposition {
        match err {
            Error::Session(session_err) => match self.on_session_error(session_err, ctx).await {
                Ok(reply) => ErrorDisposition::Handled(reply),
                Err(e) => ErrorDisposition::Failed(e),
            },
            other => ErrorDisposition::Declined(other),
        }
    }
}
