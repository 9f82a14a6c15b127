//! OpenID discovery module.
//!
//! Serves `/.well-known/openid-configuration` and, through its JWT child,
//! the key set the discovery document points at.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use keyward_core::{
    AppInfo, ConfigError, Error, OverrideConfig, Reply, RequestContext, Result, RouteDescriptor,
    RouteId, RoutableModule, UpstreamError,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod jwt;

pub use jwt::{DefaultJwtApi, DefaultJwtRecipe, JwtApi, JwtModule, JwtRecipe};

use crate::constants::{module_ids, route_ids};
use crate::providers::OpenIdCore;

/// Core path the discovery document is read from.
const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfiguration {
    /// Token issuer.
    pub issuer: String,
    /// Where the signing keys live.
    pub jwks_uri: String,
    /// Anything else the core publishes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Overridable discovery behavior.
#[async_trait]
pub trait OpenIdRecipe: Send + Sync {
    /// The discovery document.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_open_id_discovery_configuration(&self) -> Result<DiscoveryConfiguration>;
}

/// Default behavior: the core's document, re-pointed at this API.
pub struct DefaultOpenIdRecipe {
    core: Arc<dyn OpenIdCore>,
    issuer: String,
}

impl DefaultOpenIdRecipe {
    /// Recipe publishing `issuer`.
    #[must_use]
    pub fn new(core: Arc<dyn OpenIdCore>, issuer: impl Into<String>) -> Self {
        Self {
            core,
            issuer: issuer.into(),
        }
    }
}

#[async_trait]
impl OpenIdRecipe for DefaultOpenIdRecipe {
    async fn get_open_id_discovery_configuration(&self) -> Result<DiscoveryConfiguration> {
        let mut extra = match self.core.discovery_document().await? {
            Value::Object(map) => map,
            other => {
                return Err(UpstreamError::Malformed {
                    path: DISCOVERY_PATH.to_string(),
                    message: format!("expected a JSON object, got {other}"),
                }
                .into());
            }
        };
        extra.remove("issuer");
        extra.remove("jwks_uri");
        extra.remove("status");
        Ok(DiscoveryConfiguration {
            issuer: self.issuer.clone(),
            jwks_uri: format!("{}/jwt/jwks.json", self.issuer),
            extra,
        })
    }
}

/// Overridable discovery handler.
#[async_trait]
pub trait OpenIdApi: Send + Sync {
    /// Body of the discovery route.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn open_id_discovery_configuration_get(
        &self,
        recipe: &dyn OpenIdRecipe,
        ctx: &mut RequestContext,
    ) -> Result<DiscoveryConfiguration>;
}

/// Default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOpenIdApi;

#[async_trait]
impl OpenIdApi for DefaultOpenIdApi {
    async fn open_id_discovery_configuration_get(
        &self,
        recipe: &dyn OpenIdRecipe,
        _ctx: &mut RequestContext,
    ) -> Result<DiscoveryConfiguration> {
        recipe.get_open_id_discovery_configuration().await
    }
}

/// OpenID configuration.
#[derive(Clone, Default)]
pub struct OpenIdConfig {
    /// Issuer; defaults to `{api_domain}{api_base_path}`.
    pub issuer: Option<String>,
    /// Discovery overrides.
    pub overrides: OverrideConfig<dyn OpenIdRecipe, dyn OpenIdApi>,
    /// Key-set overrides.
    pub jwt_overrides: OverrideConfig<dyn JwtRecipe, dyn JwtApi>,
}

impl OpenIdConfig {
    /// Default issuer, no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the discovery overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: OverrideConfig<dyn OpenIdRecipe, dyn OpenIdApi>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Set the key-set overrides.
    #[must_use]
    pub fn with_jwt_overrides(mut self, overrides: OverrideConfig<dyn JwtRecipe, dyn JwtApi>) -> Self {
        self.jwt_overrides = overrides;
        self
    }

    fn issuer(&self, app_info: &AppInfo) -> std::result::Result<String, ConfigError> {
        match &self.issuer {
            None => Ok(format!("{}{}", app_info.api_domain, app_info.api_base_path)),
            Some(issuer) if issuer.starts_with("https://") || issuer.starts_with("http://") => {
                Ok(issuer.trim_end_matches('/').to_string())
            }
            Some(issuer) => Err(ConfigError::Invalid(format!(
                "openid issuer `{issuer}` must be an absolute http(s) URL"
            ))),
        }
    }
}

impl std::fmt::Debug for OpenIdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdConfig")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// The OpenID module.
pub struct OpenIdModule {
    routes: Vec<RouteDescriptor>,
    children: Vec<Arc<dyn RoutableModule>>,
    recipe: Arc<dyn OpenIdRecipe>,
    api: Arc<dyn OpenIdApi>,
}

impl OpenIdModule {
    /// Build the module and its JWT child.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid app info or issuer.
    pub fn new(app_info: &AppInfo, config: OpenIdConfig, core: Arc<dyn OpenIdCore>) -> Result<Self> {
        let app_info = app_info.clone().normalised()?;
        let issuer = config.issuer(&app_info)?;

        let jwt: Arc<dyn RoutableModule> = Arc::new(JwtModule::new(&config.jwt_overrides, Arc::clone(&core)));
        let recipe = config
            .overrides
            .functions
            .apply(Arc::new(DefaultOpenIdRecipe::new(core, issuer.clone())));
        let api = config.overrides.apis.apply(Arc::new(DefaultOpenIdApi));
        let routes = vec![
            RouteDescriptor::new(route_ids::OPENID_DISCOVERY, Method::GET, "/.well-known/openid-configuration")
                .with_disabled(
                    config
                        .overrides
                        .is_disabled(&RouteId::from_static(route_ids::OPENID_DISCOVERY)),
                ),
        ];

        tracing::debug!(issuer = %issuer, "OpenID module configured");
        Ok(Self {
            routes,
            children: vec![jwt],
            recipe,
            api,
        })
    }

    /// The (possibly overridden) behavior.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn OpenIdRecipe> {
        Arc::clone(&self.recipe)
    }
}

impl std::fmt::Debug for OpenIdModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenIdModule")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for OpenIdModule {
    fn id(&self) -> &str {
        module_ids::OPENID
    }

    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    fn children(&self) -> &[Arc<dyn RoutableModule>] {
        &self.children
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        tracing::debug!(route_id = %route_id, module = module_ids::OPENID, "Handling request");
        match route_id.as_str() {
            route_ids::OPENID_DISCOVERY => {
                let document = self
                    .api
                    .open_id_discovery_configuration_get(self.recipe.as_ref(), ctx)
                    .await?;
                let body = serde_json::to_value(document)
                    .map_err(|e| Error::Internal(format!("discovery document: {e}")))?;
                Ok(Reply::json(body))
            }
            other => Err(Error::Internal(format!("openid module has no route `{other}`"))),
        }
    }
}
