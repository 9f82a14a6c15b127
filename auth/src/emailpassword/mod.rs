//! Email + password module.
//!
//! Sign-up, sign-in, email existence checks and password reset. Form
//! validation failures become `FIELD_ERROR` responses through this module's
//! error handler.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use keyward_core::{
    AppInfo, Error, ErrorDisposition, OverrideConfig, Reply, RequestContext, Result, RouteDescriptor,
    RouteId, RoutableModule,
};
use serde_json::{Value, json};

pub mod api;
pub mod form;
pub mod recipe;

pub use api::{
    DefaultEmailPasswordApi, EmailPasswordApi, EmailPasswordApiOptions, PasswordResetResponse,
    SignInResponse, SignUpResponse,
};
pub use form::{FormField, FormFieldConfig};
pub use recipe::{DefaultEmailPasswordRecipe, EmailPasswordEmailLookup, EmailPasswordRecipe};

use crate::constants::{module_ids, route_ids, status};
use crate::emailverification::{EmailVerificationFeature, EmailVerificationModule};
use crate::providers::{ConsoleEmailDelivery, EmailDelivery, EmailPasswordCore};
use crate::session::SessionRecipe;

/// Email + password configuration.
#[derive(Clone)]
pub struct EmailPasswordConfig {
    /// Sign-up form fields. `email` and `password` are always added.
    pub sign_up_fields: Vec<FormFieldConfig>,
    /// Delivery of reset links.
    pub delivery: Arc<dyn EmailDelivery>,
    /// Email verification wiring.
    pub email_verification: EmailVerificationFeature,
    /// Overrides.
    pub overrides: OverrideConfig<dyn EmailPasswordRecipe, dyn EmailPasswordApi>,
}

impl EmailPasswordConfig {
    /// Default fields, console delivery, no email verification.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sign_up_fields: Vec::new(),
            delivery: Arc::new(ConsoleEmailDelivery::new()),
            email_verification: EmailVerificationFeature::Disabled,
            overrides: OverrideConfig::new(),
        }
    }

    /// Set the sign-up form fields.
    #[must_use]
    pub fn with_sign_up_fields(mut self, fields: Vec<FormFieldConfig>) -> Self {
        self.sign_up_fields = fields;
        self
    }

    /// Set the email delivery.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<dyn EmailDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the email verification wiring.
    #[must_use]
    pub fn with_email_verification(mut self, feature: EmailVerificationFeature) -> Self {
        self.email_verification = feature;
        self
    }

    /// Set the overrides.
    #[must_use]
    pub fn with_overrides(
        mut self,
        overrides: OverrideConfig<dyn EmailPasswordRecipe, dyn EmailPasswordApi>,
    ) -> Self {
        self.overrides = overrides;
        self
    }
}

impl Default for EmailPasswordConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EmailPasswordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailPasswordConfig")
            .field("sign_up_fields", &self.sign_up_fields)
            .field("email_verification", &self.email_verification)
            .field("disabled_apis", &self.overrides.disabled_apis)
            .finish_non_exhaustive()
    }
}

/// Turn field errors into the `FIELD_ERROR` response.
pub(crate) fn field_error_reply(err: Error) -> ErrorDisposition {
    match err {
        Error::FieldErrors(errors) => ErrorDisposition::Handled(Reply::json(json!({
            "status": status::FIELD_ERROR,
            "formFields": errors,
        }))),
        other => ErrorDisposition::Declined(other),
    }
}

/// The email + password module.
pub struct EmailPasswordModule {
    app_info: AppInfo,
    routes: Vec<RouteDescriptor>,
    children: Vec<Arc<dyn RoutableModule>>,
    sign_up_fields: Vec<FormFieldConfig>,
    sign_in_fields: Vec<FormFieldConfig>,
    recipe: Arc<dyn EmailPasswordRecipe>,
    api: Arc<dyn EmailPasswordApi>,
    session: Arc<dyn SessionRecipe>,
    email_verification: Option<Arc<EmailVerificationModule>>,
    delivery: Arc<dyn EmailDelivery>,
}

impl EmailPasswordModule {
    /// Build the module.
    ///
    /// An own email verification instance becomes a child; a shared one is
    /// only used.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info.
    pub fn new(
        app_info: &AppInfo,
        config: EmailPasswordConfig,
        core: Arc<dyn EmailPasswordCore>,
        session: Arc<dyn SessionRecipe>,
    ) -> Result<Self> {
        let recipe = config
            .overrides
            .functions
            .apply(Arc::new(DefaultEmailPasswordRecipe::new(core)));
        let api = config.overrides.apis.apply(Arc::new(DefaultEmailPasswordApi));
        Self::with_parts(app_info, config, recipe, api, session)
    }

    /// Build the module around ready-made behavior and handlers, as the
    /// composite does with its adapters. `config.overrides` is ignored.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info.
    pub fn with_parts(
        app_info: &AppInfo,
        config: EmailPasswordConfig,
        recipe: Arc<dyn EmailPasswordRecipe>,
        api: Arc<dyn EmailPasswordApi>,
        session: Arc<dyn SessionRecipe>,
    ) -> Result<Self> {
        let app_info = app_info.clone().normalised()?;
        let sign_up_fields = form::normalise_sign_up_fields(&config.sign_up_fields);
        let sign_in_fields = form::sign_in_fields(&sign_up_fields);

        let lookup = Arc::new(EmailPasswordEmailLookup(Arc::clone(&recipe)));
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
            route(route_ids::SIGN_UP, Method::POST, "/signup"),
            route(route_ids::SIGN_IN, Method::POST, "/signin"),
            route(route_ids::EMAIL_EXISTS, Method::GET, "/signup/email/exists"),
            route(route_ids::RESET_PASSWORD_TOKEN, Method::POST, "/user/password/reset/token"),
            route(route_ids::RESET_PASSWORD, Method::POST, "/user/password/reset"),
        ];

        Ok(Self {
            app_info,
            routes,
            children,
            sign_up_fields,
            sign_in_fields,
            recipe,
            api,
            session,
            email_verification,
            delivery: config.delivery,
        })
    }

    /// The (possibly overridden) behavior.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn EmailPasswordRecipe> {
        Arc::clone(&self.recipe)
    }

    /// Email verification in use, if any.
    #[must_use]
    pub fn email_verification(&self) -> Option<&Arc<EmailVerificationModule>> {
        self.email_verification.as_ref()
    }

    fn options(&self) -> EmailPasswordApiOptions<'_> {
        EmailPasswordApiOptions {
            recipe: self.recipe.as_ref(),
            session: self.session.as_ref(),
            email_verification: self.email_verification.as_deref(),
            delivery: self.delivery.as_ref(),
            app_info: &self.app_info,
        }
    }

    async fn sign_up(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let body: Value = ctx.json_body()?;
        let fields = form::parse_and_validate(&self.sign_up_fields, &body)?;
        Ok(match self.api.sign_up_post(&fields, &self.options(), ctx).await? {
            SignUpResponse::Ok { user, .. } => Reply::json(json!({ "status": status::OK, "user": user })),
            SignUpResponse::EmailAlreadyExists => {
                Reply::json(json!({ "status": status::EMAIL_ALREADY_EXISTS }))
            }
        })
    }

    async fn sign_in(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let body: Value = ctx.json_body()?;
        let fields = form::parse_and_validate(&self.sign_in_fields, &body)?;
        Ok(match self.api.sign_in_post(&fields, &self.options(), ctx).await? {
            SignInResponse::Ok { user, .. } => Reply::json(json!({ "status": status::OK, "user": user })),
            SignInResponse::WrongCredentials => Reply::json(json!({ "status": status::WRONG_CREDENTIALS })),
        })
    }

    async fn email_exists(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let email = ctx
            .query("email")
            .map(crate::utils::normalise_email)
            .ok_or_else(|| Error::bad_input("Please provide the email as a GET param"))?;
        let exists = self.api.email_exists_get(&email, &self.options(), ctx).await?;
        Ok(Reply::json(json!({ "status": status::OK, "exists": exists })))
    }

    async fn reset_password_token(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let body: Value = ctx.json_body()?;
        let fields = form::parse_and_validate(&form::subset(&self.sign_up_fields, &[form::EMAIL]), &body)?;
        self.api
            .generate_password_reset_token_post(&fields, &self.options(), ctx)
            .await?;
        Ok(Reply::json(json!({ "status": status::OK })))
    }

    async fn reset_password(&self, ctx: &mut RequestContext) -> Result<Reply> {
        let body: Value = ctx.json_body()?;
        let fields = form::parse_and_validate(&form::subset(&self.sign_up_fields, &[form::PASSWORD]), &body)?;
        let token = match body.get("token") {
            Some(Value::String(token)) => token.clone(),
            Some(_) => return Err(Error::bad_input("The password reset token must be a string")),
            None => return Err(Error::bad_input("Please provide the password reset token")),
        };
        Ok(match self.api.password_reset_post(&fields, &token, &self.options(), ctx).await? {
            PasswordResetResponse::Ok { .. } => Reply::json(json!({ "status": status::OK })),
            PasswordResetResponse::InvalidToken => {
                Reply::json(json!({ "status": status::RESET_PASSWORD_INVALID_TOKEN }))
            }
        })
    }
}

impl std::fmt::Debug for EmailPasswordModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailPasswordModule")
            .field("routes", &self.routes)
            .field("sign_up_fields", &self.sign_up_fields)
            .field(
                "children",
                &self.children.iter().map(|c| c.id().to_string()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for EmailPasswordModule {
    fn id(&self) -> &str {
        module_ids::EMAIL_PASSWORD
    }

    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    fn children(&self) -> &[Arc<dyn RoutableModule>] {
        &self.children
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        tracing::debug!(route_id = %route_id, module = module_ids::EMAIL_PASSWORD, "Handling request");
        match route_id.as_str() {
            route_ids::SIGN_UP => self.sign_up(ctx).await,
            route_ids::SIGN_IN => self.sign_in(ctx).await,
            route_ids::EMAIL_EXISTS => self.email_exists(ctx).await,
            route_ids::RESET_PASSWORD_TOKEN => self.reset_password_token(ctx).await,
            route_ids::RESET_PASSWORD => self.reset_password(ctx).await,
            other => Err(Error::Internal(format!("email-password module has no route `{other}`"))),
        }
    }

    async fn handle_error(&self, err: Error, _ctx: &mut RequestContext) -> ErrorDisposition {
        field_error_reply(err)
    }
}
