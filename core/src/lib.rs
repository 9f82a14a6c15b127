//! # Keyward Core
//!
//! Module tree, request dispatcher and error chain for the Keyward
//! authentication engine.
//!
//! Independently implemented authentication capabilities are exposed as
//! [`RoutableModule`]s. A [`Registry`] holds the top-level modules, resolves
//! which module owns an incoming `(method, path)`, aggregates the CORS
//! headers every module needs, and walks the modules in order to turn errors
//! into responses.
//!
//! ## Core Concepts
//!
//! - **Module**: declares routes, CORS headers and an error handler; may
//!   contain child modules
//! - **Override**: replaces a module's behavior or API handlers at construction,
//!   keeping the default to delegate to
//! - **Dispatch order**: registration order, each module before its children
//! - **Error chain**: first module that does not decline an error wins
//!
//! ## Example
//!
//! ```ignore
//! use keyward_core::{AppInfo, RegistryBuilder, RequestContext};
//!
//! let registry = RegistryBuilder::new(AppInfo::new("demo", "api.example.com", "example.com"))
//!     .with_module(session_module)?
//!     .with_module(email_password_module)?
//!     .build()?;
//!
//! let response = registry.handle(RequestContext::new(method, uri, headers).with_body(body)).await?;
//! ```

pub mod context;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod module;
pub mod overrides;
pub mod registry;
pub mod route;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use context::{AuthResponse, Reply, RequestContext, SameSite, SetCookie};
pub use dispatch::{ChainOutcome, Owner};
pub use environment::{Clock, SystemClock};
pub use error::{ConfigError, Error, FieldError, Result, SessionError, UpstreamError};
pub use module::{CompositeModule, ErrorDisposition, RoutableModule};
pub use overrides::{Override, OverrideConfig};
pub use registry::{AppInfo, Fallback, FallbackHandler, Registry, RegistryBuilder};
pub use route::{PathTemplate, RouteDescriptor, RouteId};
