//! The routable module abstraction.
//!
//! Leaf capabilities (session, email-password, ...) and composites
//! (third-party + email-password) implement the same trait. A composite
//! simply returns its children; the dispatcher and the error chain recurse
//! into them.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{Reply, RequestContext};
use crate::error::{ConfigError, Error, Result};
use crate::route::{RouteDescriptor, RouteId};

/// What a module did with an error offered to it.
#[derive(Debug)]
pub enum ErrorDisposition {
    /// Not mine; pass the (possibly same) error to the next module.
    Declined(Error),

    /// Turned into a response. The walk stops.
    Handled(Reply),

    /// Mine, but handling failed with a new error. The walk stops.
    Failed(Error),
}

/// A unit that declares routes, CORS headers and an error handler.
#[async_trait]
pub trait RoutableModule: Send + Sync {
    /// Unique module id (`"session"`, `"emailpassword"`, ...).
    fn id(&self) -> &str;

    /// Routes this module owns directly.
    fn routes(&self) -> &[RouteDescriptor] {
        &[]
    }

    /// Child modules, in dispatch order.
    fn children(&self) -> &[Arc<dyn RoutableModule>] {
        &[]
    }

    /// Request headers this module needs allowed by CORS.
    fn cors_headers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Handle a request for one of this module's own routes.
    ///
    /// # Errors
    ///
    /// Any error is handed to the error chain by the caller.
    async fn handle(&self, route_id: &RouteId, ctx: &mut RequestContext) -> Result<Reply>;

    /// Offer an error to this module. The default declines.
    async fn handle_error(&self, err: Error, _ctx: &mut RequestContext) -> ErrorDisposition {
        ErrorDisposition::Declined(err)
    }
}

/// A module that only aggregates children.
pub struct CompositeModule {
    id: String,
    children: Vec<Arc<dyn RoutableModule>>,
}

impl CompositeModule {
    /// Compose `children` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateRoute`] when two children claim the
    /// same route, or [`ConfigError::Invalid`] when two children share an id.
    pub fn new(id: impl Into<String>, children: Vec<Arc<dyn RoutableModule>>) -> Result<Self> {
        let id = id.into();
        let mut seen = BTreeSet::new();
        for child in &children {
            if !seen.insert(child.id().to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "composite `{id}` contains `{}` twice",
                    child.id()
                ))
                .into());
            }
        }
        crate::dispatch::validate_routes(&children)?;
        Ok(Self { id, children })
    }
}

impl std::fmt::Debug for CompositeModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeModule")
            .field("id", &self.id)
            .field(
                "children",
                &self.children.iter().map(|c| c.id().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[async_trait]
impl RoutableModule for CompositeModule {
    fn id(&self) -> &str {
        &self.id
    }

    fn children(&self) -> &[Arc<dyn RoutableModule>] {
        &self.children
    }

    async fn handle(&self, route_id: &RouteId, _ctx: &mut RequestContext) -> Result<Reply> {
        Err(Error::Internal(format!(
            "composite `{}` owns no route `{route_id}`",
            self.id
        )))
    }
}
