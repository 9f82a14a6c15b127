//! Third-party (OAuth) sign-in-or-up module.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use keyward_core::{
    AppInfo, ConfigError, Error, ErrorDisposition, OverrideConfig, Reply, RequestContext, Result,
    RouteDescriptor, RouteId, RoutableModule,
};
use serde_json::{Value, json};

pub mod api;
pub mod recipe;

pub use api::{DefaultThirdPartyApi, SignInUpResponse, ThirdPartyApi, ThirdPartyApiOptions};
pub use recipe::{DefaultThirdPartyRecipe, ThirdPartyEmailLookup, ThirdPartyRecipe};

use crate::constants::{module_ids, route_ids, status};
use crate::emailpassword::field_error_reply;
use crate::emailverification::{EmailVerificationFeature, EmailVerificationModule};
use crate::providers::{ThirdPartyCore, ThirdPartyProvider};
use crate::session::SessionRecipe;

/// Third-party configuration.
#[derive(Clone)]
pub struct ThirdPartyConfig {
    /// Sign-in providers; at least one, ids unique.
    pub providers: Vec<Arc<dyn ThirdPartyProvider>>,
    /// Email verification wiring.
    pub email_verification: EmailVerificationFeature,
    /// Overrides.
    pub overrides: OverrideConfig<dyn ThirdPartyRecipe, dyn ThirdPartyApi>,
}

impl ThirdPartyConfig {
    /// Configuration with the given providers.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ThirdPartyProvider>>) -> Self {
        Self {
            providers,
            email_verification: EmailVerificationFeature::Disabled,
            overrides: OverrideConfig::new(),
        }
    }

    /// Set the email verification wiring.
    #[must_use]
    pub fn with_email_verification(mut self, feature: EmailVerificationFeature) -> Self {
        self.email_verification = feature;
        self
    }

    /// Set the overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: OverrideConfig<dyn ThirdPartyRecipe, dyn ThirdPartyApi>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Check the provider list.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an empty list or duplicate ids.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "thirdparty needs at least one provider".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.id()) {
                return Err(ConfigError::Invalid(format!(
                    "thirdparty provider `{}` is configured twice",
                    provider.id()
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ThirdPartyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThirdPartyConfig")
            .field("providers", &self.providers.iter().map(|p| p.id()).collect::<Vec<_>>())
            .field("email_verification", &self.email_verification)
            .field("disabled_apis", &self.overrides.disabled_apis)
            .finish()
    }
}

/// The third-party module.
pub struct ThirdPartyModule {
    app_info: AppInfo,
    routes: Vec<RouteDescriptor>,
    children: Vec<Arc<dyn RoutableModule>>,
    providers: Vec<Arc<dyn ThirdPartyProvider>>,
    recipe: Arc<dyn ThirdPartyRecipe>,
    api: Arc<dyn ThirdPartyApi>,
    session: Arc<dyn SessionRecipe>,
    email_verification: Option<Arc<EmailVerificationModule>>,
}

impl ThirdPartyModule {
    /// Build the module.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info or providers.
    pub fn new(
        app_info: &AppInfo,
        config: ThirdPartyConfig,
        core: Arc<dyn ThirdPartyCore>,
        session: Arc<dyn SessionRecipe>,
    ) -> Result<Self> {
        let recipe = config
            .overrides
            .functions
            .apply(Arc::new(DefaultThirdPartyRecipe::new(core)));
        let api = config.overrides.apis.apply(Arc::new(DefaultThirdPartyApi));
        Self::with_parts(app_info, config, recipe, api, session)
    }

    /// Build the module around ready-made behavior and handlers.
    /// `config.overrides` only contributes disabled routes.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info or providers.
    pub fn with_parts(
        app_info: &AppInfo,
        config: ThirdPartyConfig,
        recipe: Arc<dyn ThirdPartyRecipe>,
        api: Arc<dyn ThirdPartyApi>,
        session: Arc<dyn SessionRecipe>,
    ) -> Result<Self> {
        config.validate()?;
        let app_info = app_info.clone().normalised()?;

        let lookup = Arc::new(ThirdPartyEmailLookup(Arc::clone(&recipe)));
        let (email_verification, children) =
            match config.email_verification.resolve(&app_info, &session, lookup)? {
                Some((module, true)) => {
                    let child: Arc<dyn RoutableModule> = Arc::clone(&module) as Arc<dyn RoutableModule>;
                    (Some(module), vec![child])
                }
                Some((module, false)) => (Some(module), Vec::new()),
                None => (None, Vec::new()),
            };

        let route = |id: &'static str, method: Method, path: &str| {
            RouteDescriptor::new(id, method, path)
                .with_disabled(config.overrides.is_disabled(&RouteId::from_static(id)))
        };
        let routes = vec![
            route(route_ids::AUTHORISATION_URL, Method::GET, "/authorisationurl"),
            route(route_ids::SIGN_IN_UP, Method::POST, "/signinup"),
        ];

        tracing::debug!(
            providers = ?config.providers.iter().map(|p| p.id()).collect::<Vec<_>>(),
            "Third-party module configured"
        );

        Ok(Self {
            app_info,
            routes,
            children,
            providers: config.providers,
            recipe,
            api,
            session,
            email_verification,
        })
    }

    /// The (possibly overridden) behavior.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn ThirdPartyRecipe> {
        Arc::clone(&self.recipe)
    }

    fn provider(&self, id: &str) -> Result<&dyn ThirdPartyProvider> {
        self.providers
            .iter()
            .find(|provider| provider.id() == id)
            .map(|provider| provider.as_ref())
            .ok_or_else(|| {
                Error::bad_input(format!(
                    "The third party provider {id} seems to be missing from the backend configs"
                ))
            })
    }

    fn options(&self) -> ThirdPartyApiOptions<'_> {
        ThirdPartyApiOptions {
            recipe: self.recipe.as_ref(),
            session: self.session.as_ref(),
            email_verification: self.email_verification.as_deref(),
            app_info: &self.app_info,
        }
    }

    async fn authorisation_url(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let id = ctx
            .query("thirdPartyId")
            .map(str::to_string)
            .ok_or_else(|| Error::bad_input("Please provide the thirdPartyId as a GET param"))?;
        let provider = self.provider(&id)?;
        let url = self.api.authorisation_url_get(provider, &self.options(), ctx).await?;
        Ok(Reply::json(json!({ "status": status::OK, "url": url })))
    }

    async fn sign_in_up(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let body: Value = ctx.json_body()?;
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::bad_input(format!("Please provide the {name} in request body")))
        };
        let third_party_id = field("thirdPartyId")?;
        let code = field("code")?;
        let redirect_uri = field("redirectURI")?;
        let provider = self.provider(&third_party_id)?;

        Ok(
            match self
                .api
                .sign_in_up_post(provider, &code, &redirect_uri, &self.options(), ctx)
                .await?
            {
                SignInUpResponse::Ok {
                    created_new_user,
                    user,
                    auth_code_response,
                    ..
                } => Reply::json(json!({
                    "status": status::OK,
                    "createdNewUser": created_new_user,
                    "user": user,
                    "authCodeResponse": auth_code_response,
                })),
                SignInUpResponse::NoEmailGivenByProvider => {
                    Reply::json(json!({ "status": status::NO_EMAIL_GIVEN_BY_PROVIDER }))
                }
            },
        )
    }
}

impl std::fmt::Debug for ThirdPartyModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThirdPartyModule")
            .field("routes", &self.routes)
            .field("providers", &self.providers.iter().map(|p| p.id()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for ThirdPartyModule {
    fn id(&self) -> &str {
        module_ids::THIRD_PARTY
    }

    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    fn children(&self) -> &[Arc<dyn RoutableModule>] {
        &self.children
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        tracing::debug!(route_id = %route_id, module = module_ids::THIRD_PARTY, "Handling request");
        match route_id.as_str() {
            route_ids::AUTHORISATION_URL => self.authorisation_url(ctx).await,
            route_ids::SIGN_IN_UP => self.sign_in_up(ctx).await,
            other => Err(Error::Internal(format!("third-party module has no route `{other}`"))),
        }
    }

    async fn handle_error(&self, err: Error, _ctx: &mut RequestContext) -> ErrorDisposition {
        field_error_reply(err)
    }
}
