//! JWT signing-key module: publishes the core's key set.

use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use keyward_core::{
    Error, OverrideConfig, Reply, RequestContext, Result, RouteDescriptor, RouteId, RoutableModule,
    UpstreamError,
};
use serde_json::{Value, json};

use crate::constants::{module_ids, route_ids};
use crate::providers::OpenIdCore;

/// Overridable key-set behavior.
#[async_trait]
pub trait JwtRecipe: Send + Sync {
    /// Public signing keys, as JWKs.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_jwks(&self) -> Result<Vec<Value>>;
}

/// Default behavior, backed by the core service.
pub struct DefaultJwtRecipe {
    core: Arc<dyn OpenIdCore>,
}

impl DefaultJwtRecipe {
    /// Recipe over `core`.
    #[must_use]
    pub fn new(core: Arc<dyn OpenIdCore>) -> Self {
        Self { core }
    }
}

#[async_trait]
impl JwtRecipe for DefaultJwtRecipe {
    async fn get_jwks(&self) -> Result<Vec<Value>> {
        let document = self.core.jwks().await?;
        match document.get("keys") {
            Some(Value::Array(keys)) => Ok(keys.clone()),
            _ => Err(UpstreamError::Malformed {
                path: "/recipe/jwt/jwks".to_string(),
                message: "missing `keys` array".to_string(),
            }
            .into()),
        }
    }
}

/// Overridable key-set handler.
#[async_trait]
pub trait JwtApi: Send + Sync {
    /// Body of `GET /jwt/jwks.json`.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn jwks_get(&self, recipe: &dyn JwtRecipe, ctx: &mut RequestContext) -> Result<Vec<Value>>;
}

/// Default handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultJwtApi;

#[async_trait]
impl JwtApi for DefaultJwtApi {
    async fn jwks_get(&self, recipe: &dyn JwtRecipe, _ctx: &mut RequestContext) -> Result<Vec<Value>> {
        recipe.get_jwks().await
    }
}

/// The JWT key-set module.
pub struct JwtModule {
    routes: Vec<RouteDescriptor>,
    recipe: Arc<dyn JwtRecipe>,
    api: Arc<dyn JwtApi>,
}

impl JwtModule {
    /// Build the module.
    #[must_use]
    pub fn new(overrides: &OverrideConfig<dyn JwtRecipe, dyn JwtApi>, core: Arc<dyn OpenIdCore>) -> Self {
        let recipe = overrides.functions.apply(Arc::new(DefaultJwtRecipe::new(core)));
        let api = overrides.apis.apply(Arc::new(DefaultJwtApi));
        let routes = vec![
            RouteDescriptor::new(route_ids::JWKS, Method::GET, "/jwt/jwks.json")
                .with_disabled(overrides.is_disabled(&RouteId::from_static(route_ids::JWKS))),
        ];
        Self { routes, recipe, api }
    }

    /// The (possibly overridden) behavior.
    #[must_use]
    pub fn recipe(&self) -> Arc<dyn JwtRecipe> {
        Arc::clone(&self.recipe)
    }
}

impl std::fmt::Debug for JwtModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtModule")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RoutableModule for JwtModule {
    fn id(&self) -> &str {
        module_ids::JWT
    }

    fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply> {
        match route_id.as_str() {
            route_ids::JWKS => {
                let keys = self.api.jwks_get(self.recipe.as_ref(), ctx).await?;
                Ok(Reply::json(json!({ "keys": keys })))
            }
            other => Err(Error::Internal(format!("jwt module has no route `{other}`"))),
        }
    }
}
