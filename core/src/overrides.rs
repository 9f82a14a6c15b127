//! Override injection.
//!
//! A module's behavior (its "functions" trait object) and its API handlers
//! are built once from defaults and then optionally wrapped by the caller.
//! The wrapper receives the default implementation and returns the one the
//! module will actually use; it typically keeps the default to delegate the
//! operations it does not replace.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::route::RouteId;

/// Wrapper function: default in, replacement out.
pub type OverrideFn<T> = dyn Fn(Arc<T>) -> Arc<T> + Send + Sync;

/// Either "keep the default" or a replacement function.
pub enum Override<T: ?Sized> {
    /// Use the default implementation unchanged.
    Default,

    /// Replace the default with whatever the function returns.
    Custom(Arc<OverrideFn<T>>),
}

impl<T: ?Sized> Override<T> {
    /// Build a custom override from a closure.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Apply to the default implementation.
    #[must_use]
    pub fn apply(&self, base: Arc<T>) -> Arc<T> {
        match self {
            Self::Default => base,
            Self::Custom(f) => f(base),
        }
    }

    /// `true` when nothing is overridden.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl<T: ?Sized> Default for Override<T> {
    fn default() -> Self {
        Self::Default
    }
}

impl<T: ?Sized> Clone for Override<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Default => Self::Default,
            Self::Custom(f) => Self::Custom(Arc::clone(f)),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Override<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Override::Default"),
            Self::Custom(_) => f.write_str("Override::Custom(..)"),
        }
    }
}

/// Build a component as `override.apply(defaults)`.
///
/// # Examples
///
/// ```
/// # use std::sync::Arc;
/// # use keyward_core::overrides::{inject, Override};
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct Plain;
/// impl Greeter for Plain { fn greet(&self) -> String { "hi".into() } }
/// struct Loud(Arc<dyn Greeter>);
/// impl Greeter for Loud { fn greet(&self) -> String { self.0.greet().to_uppercase() } }
///
/// let o: Override<dyn Greeter> = Override::custom(|base| Arc::new(Loud(base)));
/// assert_eq!(inject(Arc::new(Plain) as Arc<dyn Greeter>, &o).greet(), "HI");
/// assert_eq!(inject(Arc::new(Plain), &Override::Default).greet(), "hi");
/// ```
#[must_use]
pub fn inject<T: ?Sized>(defaults: Arc<T>, over: &Override<T>) -> Arc<T> {
    over.apply(defaults)
}

/// Override hooks for one module: behavior `R`, API handlers `A`, and the
/// set of routes to disable.
pub struct OverrideConfig<R: ?Sized, A: ?Sized> {
    /// Behavior override.
    pub functions: Override<R>,

    /// API handler override.
    pub apis: Override<A>,

    /// Routes that are declared but never matched.
    pub disabled_apis: BTreeSet<RouteId>,
}

impl<R: ?Sized, A: ?Sized> OverrideConfig<R, A> {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: Override::Default,
            apis: Override::Default,
            disabled_apis: BTreeSet::new(),
        }
    }

    /// Override the behavior trait object.
    #[must_use]
    pub fn with_functions<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<R>) -> Arc<R> + Send + Sync + 'static,
    {
        self.functions = Override::custom(f);
        self
    }

    /// Override the API handler trait object.
    #[must_use]
    pub fn with_apis<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<A>) -> Arc<A> + Send + Sync + 'static,
    {
        self.apis = Override::custom(f);
        self
    }

    /// Disable a route.
    #[must_use]
    pub fn disable_api(mut self, route_id: impl Into<RouteId>) -> Self {
        self.disabled_apis.insert(route_id.into());
        self
    }

    /// Is `route_id` disabled?
    #[must_use]
    pub fn is_disabled(&self, route_id: &RouteId) -> bool {
        self.disabled_apis.contains(route_id)
    }
}

impl<R: ?Sized, A: ?Sized> Default for OverrideConfig<R, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ?Sized, A: ?Sized> Clone for OverrideConfig<R, A> {
    fn clone(&self) -> Self {
        Self {
            functions: self.functions.clone(),
            apis: self.apis.clone(),
            disabled_apis: self.disabled_apis.clone(),
        }
    }
}

impl<R: ?Sized, A: ?Sized> fmt::Debug for OverrideConfig<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideConfig")
            .field("functions", &self.functions)
            .field("apis", &self.apis)
            .field("disabled_apis", &self.disabled_apis)
            .finish()
    }
}
