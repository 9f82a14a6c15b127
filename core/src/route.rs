//! Route identities and path templates.
//!
//! A route is a `(method, path)` pair claimed by exactly one module. Paths are
//! stored relative to the configured API base path and normalised so that
//! `"signin"`, `"/signin"` and `"/signin/"` all denote the same route.

use std::borrow::Cow;
use std::fmt;

use http::Method;
use serde::{Deserialize, Serialize};

/// Stable identifier of an operation inside a module (for example
/// `"emailpassword.signin"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteId(Cow<'static, str>);

impl RouteId {
    /// Route id from a static string.
    #[must_use]
    pub const fn from_static(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }

    /// Route id from an owned string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(Cow::Owned(id.into()))
    }

    /// String form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for RouteId {
    fn from(id: &'static str) -> Self {
        Self::from_static(id)
    }
}

/// Normalise a path: leading `/`, no trailing `/`, no empty segments.
///
/// The root path normalises to the empty string so it can be used as a base
/// path prefix.
///
/// # Examples
///
/// ```
/// # use keyward_core::route::normalise_path;
/// assert_eq!(normalise_path("auth/"), "/auth");
/// assert_eq!(normalise_path("//user//email/verify"), "/user/email/verify");
/// assert_eq!(normalise_path("/"), "");
/// ```
#[must_use]
pub fn normalise_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or_default();
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A normalised path that may contain `{param}` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse and normalise a template.
    #[must_use]
    pub fn new(template: &str) -> Self {
        let raw = normalise_path(template);
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self { raw, segments }
    }

    /// Normalised template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Does a concrete, already normalised path match this template?
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('/').filter(|s| !s.is_empty());
        for segment in &self.segments {
            match (segment, parts.next()) {
                (Segment::Literal(lit), Some(part)) if lit == part => {}
                (Segment::Param(_), Some(_)) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }

    /// Two templates conflict when some concrete path would match both.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    _ => true,
                })
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.raw)
        }
    }
}

/// One HTTP route declared by a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// Operation identifier, unique within the declaring module.
    pub id: RouteId,

    /// Path relative to the API base path.
    pub path: PathTemplate,

    /// HTTP method.
    pub method: Method,

    /// Disabled routes are never matched and never conflict.
    pub disabled: bool,
}

impl RouteDescriptor {
    /// Enabled route.
    #[must_use]
    pub fn new(id: impl Into<RouteId>, method: Method, path: &str) -> Self {
        Self {
            id: id.into(),
            path: PathTemplate::new(path),
            method,
            disabled: false,
        }
    }

    /// Mark the route as disabled (or not).
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Does this enabled route answer `method path`?
    #[must_use]
    pub fn answers(&self, path: &str, method: &Method) -> bool {
        !self.disabled && self.method == *method && self.path.matches(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalisation_strips_query_and_slashes() {
        assert_eq!(normalise_path("/auth/signin/?x=1"), "/auth/signin");
        assert_eq!(normalise_path(""), "");
        assert_eq!(normalise_path("signup"), "/signup");
    }

    #[test]
    fn template_matching() {
        let template = PathTemplate::new("/user/{id}/email");
        assert!(template.matches("/user/42/email"));
        assert!(!template.matches("/user/42"));
        assert!(!template.matches("/user/42/email/extra"));
        assert!(!template.matches("/users/42/email"));
    }

    #[test]
    fn templates_conflict_only_on_same_shape() {
        let a = PathTemplate::new("/user/{id}");
        let b = PathTemplate::new("/user/me");
        let c = PathTemplate::new("/users/me");
        let d = PathTemplate::new("/user/me/x");
        assert!(a.conflicts_with(&b));
        assert!(!b.conflicts_with(&c));
        assert!(!a.conflicts_with(&d));
    }

    #[test]
    fn disabled_route_never_answers() {
        let route = RouteDescriptor::new("emailpassword.signin", Method::POST, "/signin");
        assert!(route.answers("/signin", &Method::POST));
        assert!(!route.answers("/signin", &Method::GET));
        assert!(!route.clone().with_disabled(true).answers("/signin", &Method::POST));
    }
}
