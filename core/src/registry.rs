//! The module registry.
//!
//! Modules are registered once on a [`RegistryBuilder`]; [`RegistryBuilder::build`]
//! validates route ownership and freezes the set. The resulting [`Registry`]
//! is immutable and meant to be shared as `Arc<Registry>` by the transport
//! adapter.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};

use crate::context::{AuthResponse, Reply, RequestContext};
use crate::dispatch::{self, ChainOutcome, Owner};
use crate::error::{ConfigError, Error, Result};
use crate::module::RoutableModule;
use crate::route::normalise_path;

/// Header carrying the id of the module a frontend SDK is talking to.
pub const HEADER_RID: &str = "rid";

/// Header carrying the frontend protocol version.
pub const HEADER_FDI_VERSION: &str = "fdi-version";

/// Where the API and the website live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Application name (used in emails and discovery documents).
    pub app_name: String,

    /// Origin serving the API, e.g. `https://api.example.com`.
    pub api_domain: String,

    /// Origin serving the website, e.g. `https://example.com`.
    pub website_domain: String,

    /// Prefix under which all module routes are mounted.
    pub api_base_path: String,

    /// Prefix of the website's auth pages.
    pub website_base_path: String,
}

impl AppInfo {
    /// App info with `/auth` base paths.
    #[must_use]
    pub fn new(
        app_name: impl Into<String>,
        api_domain: impl Into<String>,
        website_domain: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            api_domain: api_domain.into(),
            website_domain: website_domain.into(),
            api_base_path: "/auth".to_string(),
            website_base_path: "/auth".to_string(),
        }
    }

    /// Override the API base path.
    #[must_use]
    pub fn with_api_base_path(mut self, path: impl Into<String>) -> Self {
        self.api_base_path = path.into();
        self
    }

    /// Override the website base path.
    #[must_use]
    pub fn with_website_base_path(mut self, path: impl Into<String>) -> Self {
        self.website_base_path = path.into();
        self
    }

    /// Validate and normalise.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the app name or a domain is empty.
    pub fn normalised(self) -> std::result::Result<Self, ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Invalid("app_name must not be empty".into()));
        }
        let api_domain = normalise_domain(&self.api_domain)
            .ok_or_else(|| ConfigError::Invalid("api_domain must not be empty".into()))?;
        let website_domain = normalise_domain(&self.website_domain)
            .ok_or_else(|| ConfigError::Invalid("website_domain must not be empty".into()))?;

        Ok(Self {
            app_name: self.app_name,
            api_domain,
            website_domain,
            api_base_path: normalise_path(&self.api_base_path),
            website_base_path: normalise_path(&self.website_base_path),
        })
    }

    /// Strip the API base path from a normalised request path. `None` when
    /// the request is outside the base path.
    #[must_use]
    pub fn strip_api_base_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.api_base_path.as_str())?;
        (rest.is_empty() || rest.starts_with('/')).then_some(rest)
    }
}

fn normalise_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains("://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{trimmed}"))
    }
}

/// Handles requests that no module owns.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    /// Produce a response for an unowned request.
    ///
    /// # Errors
    ///
    /// Errors are surfaced to the transport adapter.
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Reply>;
}

/// What to do with unowned requests.
#[derive(Clone, Default)]
pub enum Fallback {
    /// Empty `404 Not Found`.
    #[default]
    NotFound,

    /// Caller-supplied handler.
    Handler(Arc<dyn FallbackHandler>),
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("Fallback::NotFound"),
            Self::Handler(_) => f.write_str("Fallback::Handler(..)"),
        }
    }
}

/// Collects modules before the registry is frozen.
pub struct RegistryBuilder {
    app_info: AppInfo,
    modules: Vec<Arc<dyn RoutableModule>>,
    fallback: Fallback,
}

impl RegistryBuilder {
    /// Start a registry for `app_info`.
    #[must_use]
    pub fn new(app_info: AppInfo) -> Self {
        Self {
            app_info,
            modules: Vec::new(),
            fallback: Fallback::NotFound,
        }
    }

    /// Register a top-level module.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AlreadyInitialised`] if a module with the same
    /// id is already registered. The first module stays registered.
    pub fn register(&mut self, module: Arc<dyn RoutableModule>) -> std::result::Result<&mut Self, ConfigError> {
        if self.modules.iter().any(|m| m.id() == module.id()) {
            tracing::warn!(module = module.id(), "Module registered twice");
            return Err(ConfigError::AlreadyInitialised {
                module: module.id().to_string(),
            });
        }
        tracing::debug!(module = module.id(), "Module registered");
        self.modules.push(module);
        Ok(self)
    }

    /// Builder-style [`register`](Self::register).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with_module(mut self, module: Arc<dyn RoutableModule>) -> std::result::Result<Self, ConfigError> {
        self.register(module)?;
        Ok(self)
    }

    /// Set the fallback for unowned requests.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Validate and freeze.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for invalid app info or conflicting routes.
    pub fn build(self) -> Result<Registry> {
        let app_info = self.app_info.normalised()?;
        dispatch::validate_routes(&self.modules)?;

        let mut cors = dispatch::collect_cors_headers(&self.modules);
        cors.insert(HEADER_RID.to_string());
        cors.insert(HEADER_FDI_VERSION.to_string());

        tracing::info!(
            app_name = %app_info.app_name,
            api_base_path = %app_info.api_base_path,
            modules = self.modules.len(),
            "Auth registry built"
        );

        Ok(Registry {
            app_info,
            modules: self.modules,
            cors,
            fallback: self.fallback,
        })
    }
}

/// Immutable set of registered modules.
pub struct Registry {
    app_info: AppInfo,
    modules: Vec<Arc<dyn RoutableModule>>,
    cors: BTreeSet<String>,
    fallback: Fallback,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("app_info", &self.app_info)
            .field("modules", &self.modules.iter().map(|m| m.id().to_string()).collect::<Vec<_>>())
            .field("cors", &self.cors)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Registry {
    /// Normalised app info.
    #[must_use]
    pub const fn app_info(&self) -> &AppInfo {
        &self.app_info
    }

    /// Top-level modules in registration order.
    #[must_use]
    pub fn modules(&self) -> &[Arc<dyn RoutableModule>] {
        &self.modules
    }

    /// Look up a top-level module.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotInitialised`] if no such module is registered.
    pub fn module(&self, id: &str) -> std::result::Result<Arc<dyn RoutableModule>, ConfigError> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .cloned()
            .ok_or_else(|| ConfigError::NotInitialised { module: id.to_string() })
    }

    /// Union of CORS headers of every module plus the protocol headers.
    #[must_use]
    pub const fn cors_headers(&self) -> &BTreeSet<String> {
        &self.cors
    }

    /// Owner of `method path`, where `path` is the full request path.
    #[must_use]
    pub fn resolve(&self, path: &str, method: &Method) -> Option<Owner> {
        let relative = self.app_info.strip_api_base_path(path)?;
        dispatch::resolve_owner(&self.modules, relative, method)
    }

    /// Route, dispatch and run the error chain for one request.
    ///
    /// # Errors
    ///
    /// Returns the error when no module turns it into a response.
    pub async fn handle(&self, mut ctx: RequestContext) -> Result<AuthResponse> {
        let Some(owner) = self.resolve(ctx.path(), ctx.method()) else {
            return self.fallback(ctx).await;
        };

        match dispatch::dispatch(&owner, &mut ctx).await {
            Ok(reply) => Ok(ctx.into_response(reply)),
            Err(err) => {
                tracing::debug!(
                    module = owner.module.id(),
                    route_id = %owner.route_id,
                    error = %err,
                    "Handler failed, running error chain"
                );
                self.handle_error(err, ctx).await
            }
        }
    }

    /// Offer an error to every module in dispatch order.
    ///
    /// Used by [`handle`](Self::handle) and by transport extractors that
    /// verify sessions outside the module routes.
    ///
    /// # Errors
    ///
    /// Returns the original error if nobody handles it, or the new error
    /// if the claiming module's handler failed.
    pub async fn handle_error(&self, err: Error, mut ctx: RequestContext) -> Result<AuthResponse> {
        match dispatch::handle_error(&self.modules, err, &mut ctx).await {
            ChainOutcome::Handled(reply) => Ok(ctx.into_response(reply)),
            ChainOutcome::Failed { error, .. } | ChainOutcome::Unhandled(error) => Err(error),
        }
    }

    async fn fallback(&self, mut ctx: RequestContext) -> Result<AuthResponse> {
        match &self.fallback {
            Fallback::NotFound => Ok(ctx.into_response(Reply {
                status: StatusCode::NOT_FOUND,
                body: None,
            })),
            Fallback::Handler(handler) => {
                let reply = handler.handle(&mut ctx).await?;
                Ok(ctx.into_response(reply))
            }
        }
    }
}
