//! Email verification module.
//!
//! Usually embedded: email-password and third-party create their own
//! instance, the composite shares one between both children.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use keyward_core::{
    AppInfo, Error, OverrideConfig, Reply, RequestContext, Result, RouteDescriptor, RouteId,
    RoutableModule,
};
use serde::Deserialize;
use serde_json::json;

pub mod api;
pub mod recipe;

pub use api::{
    DefaultEmailVerificationApi, EmailVerificationApi, EmailVerificationApiOptions,
    GenerateEmailVerifyTokenResponse, VerifyEmailResponse,
};
pub use recipe::{DefaultEmailVerificationRecipe, EmailVerificationRecipe, UserEmailLookup};

use crate::constants::{module_ids, route_ids, status};
use crate::providers::{ConsoleEmailDelivery, EmailDelivery, EmailVerificationCore};
use crate::session::SessionRecipe;

/// Email verification configuration.
#[derive(Clone)]
pub struct EmailVerificationConfig {
    /// Delivery of verification links.
    pub delivery: Arc<dyn EmailDelivery>,
    /// Overrides.
    pub overrides: OverrideConfig<dyn EmailVerificationRecipe, dyn EmailVerificationApi>,
}

impl EmailVerificationConfig {
    /// Console delivery, no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delivery: Arc::new(ConsoleEmailDelivery::new()),
            overrides: OverrideConfig::new(),
        }
    }

    /// Set the email delivery.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<dyn EmailDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the overrides.
    #[must_use]
    pub fn with_overrides(
        mut self,
        overrides: OverrideConfig<dyn EmailVerificationRecipe, dyn EmailVerificationApi>,
    ) -> Self {
        self.overrides = overrides;
        self
    }
}

impl Default for EmailVerificationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EmailVerificationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailVerificationConfig")
            .field("disabled_apis", &self.overrides.disabled_apis)
            .finish_non_exhaustive()
    }
}

/// How a user-facing module gets its email verification.
#[derive(Clone, Default)]
pub enum EmailVerificationFeature {
    /// No email verification.
    #[default]
    Disabled,
    /// Build an own instance, exposed as a child of the module.
    Create {
        /// Core used for verification tokens.
        core: Arc<dyn EmailVerificationCore>,
        /// Instance configuration.
        config: EmailVerificationConfig,
    },
    /// Use an instance owned (and routed) elsewhere.
    Shared(Arc<EmailVerificationModule>),
}

impl EmailVerificationFeature {
    /// Resolve into `(instance, owned)` where `owned` means the caller must
    /// expose it as a child.
    ///
    /// # Errors
    ///
    /// Config errors from building an own instance.
    pub fn resolve(
        self,
        app_info: &AppInfo,
        session: &Arc<dyn SessionRecipe>,
        email_lookup: Arc<dyn UserEmailLookup>,
    ) -> Result<Option<(Arc<EmailVerificationModule>, bool)>> {
        Ok(match self {
            Self::Disabled => None,
            Self::Create { core, config } => Some((
                Arc::new(EmailVerificationModule::new(
                    app_info,
                    config,
                    core,
                    Arc::clone(session),
                    email_lookup,
                )?),
                true,
            )),
            Self::Shared(module) => Some((module, false)),
        })
    }
}

impl std::fmt::Debug for EmailVerificationFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Create { config, .. } => f.debug_struct("Create").field("config", config).finish_non_exhaustive(),
            Self::Shared(module) => f.debug_tuple("Shared").field(module).finish(),
        }
    }
}

#[derive(Deserialize)]
struct VerifyEmailBody {
    method: Option<String>,
    token: Option<serde_json::Value>,
}

/// The email verification module.
pub struct EmailVerificationModule {
    app_info: AppInfo,
    routes: Vec<RouteDescriptor>,
    recipe: Arc<dyn EmailVerificationRecipe>,
    api: Arc<dyn EmailVerificationApi>,
    session: Arc<dyn SessionRecipe>,
    email_lookup: Arc<dyn UserEmailLookup>,
    delivery: Arc<dyn EmailDelivery>,
}

impl EmailVerificationModule {
    /// Build the module.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info.
    pub fn new(
        app_info: &AppInfo,
        config: EmailVerificationConfig,
        core: Arc<dyn EmailVerificationCore>,
        session: Arc<dyn SessionRecipe>,
        email_lookup: Arc<dyn UserEmailLookup>,
    ) -> Result<Self> {
        let app_info = app_info.clone().normalised()?;
        let recipe = config
            .overrides
            .functions
            .apply(Arc::new(DefaultEmailVerificationRecipe::new(core)));
        let api = config.overrides.apis.apply(Arc::new(DefaultEmailVerificationApi));

        let route = |id: &'static str, method: Method, path: &str| {
            RouteDescriptor::new(id, method, path)
                .with_disabled(config.overrides.is_disabled(&RouteId::from_static(id)))
        };
        let routes = vec![
            route(route_ids::GENERATE_EMAIL_VERIFY_TOKEN, Method::POST, "/user/email/verify/token"),
            route(route_ids::VERIFY_EMAIL, Method::POST, "/user/email/verify"),
            route(route_ids::IS_EMAIL_VERIFIED, Method::GET, "/user/email/verify"),
        ];

        Ok(Self {
            app_info,
            routes,
            recipe,
            api,
            session,
            email_lookup,
            delivery: config.delivery,
        })
    }

    /// The (possibly overridden) behavior.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn EmailVerificationRecipe> {
        Arc::clone(&self.recipe)
    }

    /// Mark `email` verified for `user_id` without sending a link, as done
    /// for emails a provider already verified.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    pub async fn mark_verified(&self, user_id: &str, email: &str) -> Result<()> {
        use crate::providers::CreateEmailVerificationTokenResult;

        if let CreateEmailVerificationTokenResult::Ok(token) = self
            .recipe
            .create_email_verification_token(user_id, email)
            .await?
        {
            self.recipe.verify_email_using_token(&token).await?;
        }
        Ok(())
    }

    fn options(&self) -> EmailVerificationApiOptions<'_> {
        EmailVerificationApiOptions {
            recipe: self.recipe.as_ref(),
            session: self.session.as_ref(),
            email_lookup: self.email_lookup.as_ref(),
            delivery: self.delivery.as_ref(),
            app_info: &self.app_info,
        }
    }

    async fn verify_email(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let body: VerifyEmailBody = ctx.json_body()?;
        if body.method.as_deref() != Some("token") {
            return Err(Error::bad_input("Unsupported method for email verification"));
        }
        let token = match body.token {
            Some(serde_json::Value::String(token)) => token,
            Some(_) => return Err(Error::bad_input("The email verification token must be a string")),
            None => return Err(Error::bad_input("Please provide the email verification token")),
        };

        Ok(match self.api.verify_email_post(&token, &self.options(), ctx).await? {
            VerifyEmailResponse::Ok { user_id, email } => Reply::json(json!({
                "status": status::OK,
                "user": { "id": user_id, "email": email },
            })),
            VerifyEmailResponse::InvalidToken => {
                Reply::json(json!({ "status": status::EMAIL_VERIFICATION_INVALID_TOKEN }))
            }
        })
    }
}

impl std::fmt::Debug for EmailVerificationModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailVerificationModule")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for EmailVerificationModule {
    fn id(&self) -> &str {
        module_ids::EMAIL_VERIFICATION
    }

    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        tracing::debug!(route_id = %route_id, module = module_ids::EMAIL_VERIFICATION, "Handling request");
        match route_id.as_str() {
            route_ids::GENERATE_EMAIL_VERIFY_TOKEN => {
                Ok(match self.api.generate_email_verify_token_post(&self.options(), ctx).await? {
                    GenerateEmailVerifyTokenResponse::Ok => Reply::json(json!({ "status": status::OK })),
                    GenerateEmailVerifyTokenResponse::EmailAlreadyVerified => {
                        Reply::json(json!({ "status": status::EMAIL_ALREADY_VERIFIED }))
                    }
                })
            }
            route_ids::VERIFY_EMAIL => self.verify_email(ctx).await,
            route_ids::IS_EMAIL_VERIFIED => {
                let verified = self.api.is_email_verified_get(&self.options(), ctx).await?;
                Ok(Reply::json(json!({ "status": status::OK, "isVerified": verified })))
            }
            other => Err(Error::Internal(format!("email verification module has no route `{other}`"))),
        }
    }
}
