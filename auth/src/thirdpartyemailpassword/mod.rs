//! Third-party + email-password composite.
//!
//! One combined behavior and one set of combined handlers, served through
//! three children in dispatch order: email-password, third-party (only when
//! providers are configured) and a single shared email verification.

use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::{
    AppInfo, CompositeModule, OverrideConfig, Reply, RequestContext, Result, RouteId, RoutableModule,
};

pub mod adapters;
pub mod api;
pub mod recipe;

pub use api::{DefaultThirdPartyEmailPasswordApi, ThirdPartyEmailPasswordApi};
pub use recipe::{CombinedEmailLookup, DefaultThirdPartyEmailPasswordRecipe, ThirdPartyEmailPasswordRecipe};

use crate::constants::module_ids;
use crate::emailpassword::{EmailPasswordConfig, EmailPasswordModule, FormFieldConfig};
use crate::emailverification::{EmailVerificationConfig, EmailVerificationFeature, EmailVerificationModule};
use crate::providers::{
    ConsoleEmailDelivery, EmailDelivery, EmailPasswordCore, EmailVerificationCore, ThirdPartyCore,
    ThirdPartyProvider,
};
use crate::session::SessionRecipe;
use crate::thirdparty::{ThirdPartyConfig, ThirdPartyModule};
use adapters::{EmailPasswordApiAdapter, EmailPasswordRecipeAdapter, ThirdPartyApiAdapter, ThirdPartyRecipeAdapter};

/// Composite configuration.
#[derive(Clone)]
pub struct ThirdPartyEmailPasswordConfig {
    /// Sign-up form fields.
    pub sign_up_fields: Vec<FormFieldConfig>,
    /// Providers; none means no third-party child.
    pub providers: Vec<Arc<dyn ThirdPartyProvider>>,
    /// Delivery of reset links.
    pub delivery: Arc<dyn EmailDelivery>,
    /// The shared email verification.
    pub email_verification: EmailVerificationConfig,
    /// Combined overrides. Disabled route ids apply to both children.
    pub overrides: OverrideConfig<dyn ThirdPartyEmailPasswordRecipe, dyn ThirdPartyEmailPasswordApi>,
}

impl ThirdPartyEmailPasswordConfig {
    /// No providers, default fields, console delivery.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sign_up_fields: Vec::new(),
            providers: Vec::new(),
            delivery: Arc::new(ConsoleEmailDelivery::new()),
            email_verification: EmailVerificationConfig::new(),
            overrides: OverrideConfig::new(),
        }
    }

    /// Set the sign-up form fields.
    #[must_use]
    pub fn with_sign_up_fields(mut self, fields: Vec<FormFieldConfig>) -> Self {
        self.sign_up_fields = fields;
        self
    }

    /// Set the providers.
    #[must_use]
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ThirdPartyProvider>>) -> Self {
        self.providers = providers;
        self
    }

    /// Set the reset-link delivery.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<dyn EmailDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Configure the shared email verification.
    #[must_use]
    pub fn with_email_verification(mut self, config: EmailVerificationConfig) -> Self {
        self.email_verification = config;
        self
    }

    /// Set the combined overrides.
    #[must_use]
    pub fn with_overrides(
        mut self,
        overrides: OverrideConfig<dyn ThirdPartyEmailPasswordRecipe, dyn ThirdPartyEmailPasswordApi>,
    ) -> Self {
        self.overrides = overrides;
        self
    }
}

impl Default for ThirdPartyEmailPasswordConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ThirdPartyEmailPasswordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThirdPartyEmailPasswordConfig")
            .field("sign_up_fields", &self.sign_up_fields)
            .field("providers", &self.providers.iter().map(|p| p.id()).collect::<Vec<_>>())
            .field("email_verification", &self.email_verification)
            .field("disabled_apis", &self.overrides.disabled_apis)
            .finish_non_exhaustive()
    }
}

/// The composite module.
pub struct ThirdPartyEmailPasswordModule {
    composite: CompositeModule,
    recipe: Arc<dyn ThirdPartyEmailPasswordRecipe>,
    email_verification: Arc<EmailVerificationModule>,
}

impl ThirdPartyEmailPasswordModule {
    /// Build the composite over a core that serves both kinds of users and
    /// email verification.
    ///
    /// # Errors
    ///
    /// Config errors from the children, including route clashes.
    pub fn new<C>(
        app_info: &AppInfo,
        config: ThirdPartyEmailPasswordConfig,
        core: Arc<C>,
        session: Arc<dyn SessionRecipe>,
    ) -> Result<Self>
    where
        C: EmailPasswordCore + ThirdPartyCore + EmailVerificationCore + 'static,
    {
        let email_password_core: Arc<dyn EmailPasswordCore> = Arc::clone(&core) as Arc<dyn EmailPasswordCore>;
        let third_party_core: Arc<dyn ThirdPartyCore> = Arc::clone(&core) as Arc<dyn ThirdPartyCore>;
        let verification_core: Arc<dyn EmailVerificationCore> = core;

        let recipe = config.overrides.functions.apply(Arc::new(
            DefaultThirdPartyEmailPasswordRecipe::new(email_password_core, third_party_core),
        ));
        let api = config
            .overrides
            .apis
            .apply(Arc::new(DefaultThirdPartyEmailPasswordApi));

        let email_verification = Arc::new(EmailVerificationModule::new(
            app_info,
            config.email_verification,
            verification_core,
            Arc::clone(&session),
            Arc::new(CombinedEmailLookup(Arc::clone(&recipe))),
        )?);

        let disabled = config.overrides.disabled_apis.clone();
        let mut children: Vec<Arc<dyn RoutableModule>> = Vec::new();

        let mut email_password_overrides = OverrideConfig::new();
        email_password_overrides.disabled_apis = disabled.clone();
        children.push(Arc::new(EmailPasswordModule::with_parts(
            app_info,
            EmailPasswordConfig::new()
                .with_sign_up_fields(config.sign_up_fields)
                .with_delivery(config.delivery)
                .with_email_verification(EmailVerificationFeature::Shared(Arc::clone(&email_verification)))
                .with_overrides(email_password_overrides),
            Arc::new(EmailPasswordRecipeAdapter(Arc::clone(&recipe))),
            Arc::new(EmailPasswordApiAdapter(Arc::clone(&api))),
            Arc::clone(&session),
        )?));

        if !config.providers.is_empty() {
            let mut third_party_overrides = OverrideConfig::new();
            third_party_overrides.disabled_apis = disabled;
            children.push(Arc::new(ThirdPartyModule::with_parts(
                app_info,
                ThirdPartyConfig::new(config.providers)
                    .with_email_verification(EmailVerificationFeature::Shared(Arc::clone(&email_verification)))
                    .with_overrides(third_party_overrides),
                Arc::new(ThirdPartyRecipeAdapter(Arc::clone(&recipe))),
                Arc::new(ThirdPartyApiAdapter(api)),
                session,
            )?));
        }

        children.push(Arc::clone(&email_verification) as Arc<dyn RoutableModule>);

        Ok(Self {
            composite: CompositeModule::new(module_ids::THIRD_PARTY_EMAIL_PASSWORD, children)?,
            recipe,
            email_verification,
        })
    }

    /// The (possibly overridden) combined behavior.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn ThirdPartyEmailPasswordRecipe> {
        Arc::clone(&self.recipe)
    }

    /// The shared email verification.
    #[must_use]
    pub fn email_verification(&self) -> &Arc<EmailVerificationModule> {
        &self.email_verification
    }
}

impl std::fmt::Debug for ThirdPartyEmailPasswordModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThirdPartyEmailPasswordModule")
            .field("composite", &self.composite)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for ThirdPartyEmailPasswordModule {
    fn id(&self) -> &str {
        self.composite.id()
    }

    fn children(&self) -> &[Arc<dyn RoutableModule>] {
        self.composite.children()
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        self.composite.handle(route_id, ctx).await
    }
}
