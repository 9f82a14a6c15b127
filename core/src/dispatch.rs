//! Route resolution, CORS aggregation and the error chain.
//!
//! All three walk the module forest in the same order: each module first,
//! then its children in composed order, recursively (pre-order).

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use http::Method;

use crate::context::{Reply, RequestContext};
use crate::error::{ConfigError, Error, Result};
use crate::module::{ErrorDisposition, RoutableModule};
use crate::route::RouteId;

/// The module that owns a request, and which of its routes matched.
#[derive(Clone)]
pub struct Owner {
    /// Owning module.
    pub module: Arc<dyn RoutableModule>,

    /// Matched route.
    pub route_id: RouteId,
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Owner")
            .field("module", &self.module.id())
            .field("route_id", &self.route_id)
            .finish()
    }
}

/// Pre-order flattening of a module forest.
#[must_use]
pub fn flatten(modules: &[Arc<dyn RoutableModule>]) -> Vec<Arc<dyn RoutableModule>> {
    fn visit(module: &Arc<dyn RoutableModule>, out: &mut Vec<Arc<dyn RoutableModule>>) {
        out.push(Arc::clone(module));
        for child in module.children() {
            visit(child, out);
        }
    }

    let mut out = Vec::new();
    for module in modules {
        visit(module, &mut out);
    }
    out
}

/// First module (in dispatch order) with an enabled route answering
/// `method path`. `path` is relative to the API base path.
#[must_use]
pub fn resolve_owner(
    modules: &[Arc<dyn RoutableModule>],
    path: &str,
    method: &Method,
) -> Option<Owner> {
    for module in modules {
        if let Some(route) = module.routes().iter().find(|r| r.answers(path, method)) {
            return Some(Owner {
                module: Arc::clone(module),
                route_id: route.id.clone(),
            });
        }
        if let Some(owner) = resolve_owner(module.children(), path, method) {
            return Some(owner);
        }
    }
    None
}

/// Run the owner's handler. Errors are returned untouched.
///
/// # Errors
///
/// Whatever the handler returns.
pub async fn dispatch(owner: &Owner, ctx: &mut RequestContext) -> Result<Reply> {
    tracing::debug!(module = owner.module.id(), route_id = %owner.route_id, "Dispatching request");
    owner.module.handle(&owner.route_id, ctx).await
}

/// Union of every module's CORS headers, lower-cased.
#[must_use]
pub fn collect_cors_headers(modules: &[Arc<dyn RoutableModule>]) -> BTreeSet<String> {
    flatten(modules)
        .iter()
        .flat_map(|m| m.cors_headers())
        .map(|h| h.to_ascii_lowercase())
        .collect()
}

/// Result of walking the error chain.
#[derive(Debug)]
pub enum ChainOutcome {
    /// A module produced a response.
    Handled(Reply),

    /// A module claimed the error but failed while handling it.
    Failed {
        /// Module that failed.
        module: String,
        /// The new error.
        error: Error,
    },

    /// Nobody claimed the error.
    Unhandled(Error),
}

/// Offer `err` to each module in dispatch order until one stops the walk.
pub async fn handle_error(
    modules: &[Arc<dyn RoutableModule>],
    err: Error,
    ctx: &mut RequestContext,
) -> ChainOutcome {
    let mut err = err;
    for module in flatten(modules) {
        match module.handle_error(err, ctx).await {
            ErrorDisposition::Declined(e) => err = e,
            ErrorDisposition::Handled(reply) => {
                tracing::debug!(module = module.id(), status = %reply.status, "Error handled");
                return ChainOutcome::Handled(reply);
            }
            ErrorDisposition::Failed(error) => {
                tracing::warn!(module = module.id(), error = %error, "Error handler failed");
                return ChainOutcome::Failed {
                    module: module.id().to_string(),
                    error,
                };
            }
        }
    }
    ChainOutcome::Unhandled(err)
}

/// Check route ownership across a module forest.
///
/// # Errors
///
/// - [`ConfigError::DuplicateRouteId`] if one module declares an id twice
/// - [`ConfigError::DuplicateRoute`] if two enabled routes with the same
///   method have conflicting paths
pub fn validate_routes(modules: &[Arc<dyn RoutableModule>]) -> Result<()> {
    let flat = flatten(modules);

    for module in &flat {
        let mut ids = HashSet::new();
        for route in module.routes() {
            if !ids.insert(&route.id) {
                return Err(ConfigError::DuplicateRouteId {
                    module: module.id().to_string(),
                    route_id: route.id.to_string(),
                }
                .into());
            }
        }
    }

    let mut claimed: Vec<(&str, &crate::route::RouteDescriptor)> = Vec::new();
    for module in &flat {
        for route in module.routes().iter().filter(|r| !r.disabled) {
            if let Some((first, _)) = claimed
                .iter()
                .find(|(_, c)| c.method == route.method && c.path.conflicts_with(&route.path))
            {
                return Err(ConfigError::duplicate_route(
                    &route.method,
                    route.path.to_string(),
                    *first,
                    module.id(),
                )
                .into());
            }
            claimed.push((module.id(), route));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::module::CompositeModule;
    use crate::route::RouteDescriptor;
    use async_trait::async_trait;
    use http::{HeaderMap, StatusCode};
    use proptest::prelude::*;
    use serde_json::json;

    struct Leaf {
        id: String,
        routes: Vec<RouteDescriptor>,
        cors: Vec<String>,
        claims: bool,
    }

    impl Leaf {
        fn new(id: &str, routes: Vec<RouteDescriptor>) -> Arc<dyn RoutableModule> {
            Arc::new(Self {
                id: id.into(),
                routes,
                cors: vec![format!("X-{id}")],
                claims: false,
            })
        }

        fn claiming(id: &str) -> Arc<dyn RoutableModule> {
            Arc::new(Self {
                id: id.into(),
                routes: vec![],
                cors: vec![],
                claims: true,
            })
        }
    }

    #[async_trait]
    impl RoutableModule for Leaf {
        fn id(&self) -> &str {
            &self.id
        }

        fn routes(&self) -> &[RouteDescriptor] {
            &self.routes
        }

        fn cors_headers(&self) -> Vec<String> {
            self.cors.clone()
        }

        async fn handle(&self, route_id: &RouteId, _ctx: &mut RequestContext) -> Result<Reply> {
            Ok(Reply::json(json!({ "module": self.id, "route": route_id.as_str() })))
        }

        async fn handle_error(&self, err: Error, _ctx: &mut RequestContext) -> ErrorDisposition {
            if self.claims {
                ErrorDisposition::Handled(Reply::message(StatusCode::IM_A_TEAPOT, &self.id))
            } else {
                ErrorDisposition::Declined(err)
            }
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Method::POST, "/", HeaderMap::new())
    }

    #[test]
    fn resolves_own_routes_before_children() {
        let child = Leaf::new("child", vec![RouteDescriptor::new("child.a", Method::POST, "/a")]);
        let parent = Arc::new(CompositeModule::new("parent", vec![child]).unwrap());
        let modules: Vec<Arc<dyn RoutableModule>> = vec![
            parent,
            Leaf::new("other", vec![RouteDescriptor::new("other.b", Method::GET, "/b")]),
        ];

        let owner = resolve_owner(&modules, "/a", &Method::POST).unwrap();
        assert_eq!(owner.module.id(), "child");
        assert_eq!(owner.route_id.as_str(), "child.a");

        assert!(resolve_owner(&modules, "/a", &Method::GET).is_none());
        assert_eq!(resolve_owner(&modules, "/b", &Method::GET).unwrap().module.id(), "other");
        assert!(resolve_owner(&modules, "/missing", &Method::GET).is_none());
    }

    #[test]
    fn disabled_routes_are_skipped_and_do_not_conflict() {
        let modules = vec![
            Leaf::new(
                "a",
                vec![RouteDescriptor::new("a.x", Method::POST, "/x").with_disabled(true)],
            ),
            Leaf::new("b", vec![RouteDescriptor::new("b.x", Method::POST, "/x")]),
        ];
        assert!(validate_routes(&modules).is_ok());
        assert_eq!(resolve_owner(&modules, "/x", &Method::POST).unwrap().module.id(), "b");
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let modules = vec![
            Leaf::new("a", vec![RouteDescriptor::new("a.x", Method::POST, "/x")]),
            Leaf::new("b", vec![RouteDescriptor::new("b.x", Method::POST, "/x/")]),
        ];
        let err = validate_routes(&modules).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::DuplicateRoute { ref first, ref second, .. })
                if first == "a" && second == "b"
        ));

        let modules = vec![Leaf::new(
            "a",
            vec![
                RouteDescriptor::new("a.x", Method::POST, "/x"),
                RouteDescriptor::new("a.x", Method::GET, "/y"),
            ],
        )];
        assert!(matches!(
            validate_routes(&modules),
            Err(Error::Config(ConfigError::DuplicateRouteId { .. }))
        ));
    }

    #[test]
    fn same_path_different_method_is_fine() {
        let modules = vec![
            Leaf::new("a", vec![RouteDescriptor::new("a.x", Method::POST, "/user/email/verify")]),
            Leaf::new("b", vec![RouteDescriptor::new("b.x", Method::GET, "/user/email/verify")]),
        ];
        assert!(validate_routes(&modules).is_ok());
    }

    #[tokio::test]
    async fn error_chain_stops_at_first_claimant() {
        let modules = vec![
            Leaf::new("first", vec![]),
            Leaf::claiming("second"),
            Leaf::claiming("third"),
        ];
        match handle_error(&modules, Error::bad_input("x"), &mut ctx()).await {
            ChainOutcome::Handled(reply) => {
                assert_eq!(reply.body.unwrap()["message"], "second");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unclaimed_error_comes_back() {
        let modules = vec![Leaf::new("only", vec![])];
        let outcome = handle_error(&modules, Error::bad_input("x"), &mut ctx()).await;
        assert!(matches!(outcome, ChainOutcome::Unhandled(Error::BadInput(_))));
    }

    #[tokio::test]
    async fn dispatch_calls_owner() {
        let modules = vec![Leaf::new("a", vec![RouteDescriptor::new("a.x", Method::POST, "/x")])];
        let owner = resolve_owner(&modules, "/x", &Method::POST).unwrap();
        let reply = dispatch(&owner, &mut ctx()).await.unwrap();
        assert_eq!(reply.body.unwrap()["route"], "a.x");
    }

    proptest! {
        #[test]
        fn cors_union_is_order_independent(ids in prop::collection::vec("[a-z]{1,6}", 1..6)) {
            let forward: Vec<_> = ids.iter().map(|id| Leaf::new(id, vec![])).collect();
            let mut backward = forward.clone();
            backward.reverse();

            let expected: BTreeSet<String> = ids.iter().map(|id| format!("x-{id}")).collect();
            prop_assert_eq!(collect_cors_headers(&forward), expected.clone());
            prop_assert_eq!(collect_cors_headers(&backward), expected);
        }

        #[test]
        fn resolution_is_deterministic(n in 1usize..8, pick in 0usize..8) {
            let modules: Vec<_> = (0..n)
                .map(|i| {
                    let path = format!("/r{i}");
                    Leaf::new(&format!("m{i}"), vec![RouteDescriptor::new(RouteId::new(format!("m{i}.r")), Method::POST, &path)])
                })
                .collect();
            let target = format!("/r{}", pick % n);
            let first = resolve_owner(&modules, &target, &Method::POST).map(|o| o.module.id().to_string());
            let second = resolve_owner(&modules, &target, &Method::POST).map(|o| o.module.id().to_string());
            prop_assert_eq!(first.clone(), second);
            prop_assert_eq!(first, Some(format!("m{}", pick % n)));
        }
    }
}
