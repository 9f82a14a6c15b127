//! Axum transport adapter for Keyward.
//!
//! The engine (`keyward-core`, `keyward-auth`) only knows the `http` types.
//! This crate plugs it into an axum application:
//!
//! 1. **Correlation id** layer tags every request and its tracing span
//! 2. **CORS** layer built from the headers the registered modules need
//! 3. **Auth middleware** answers every request an auth module owns and
//!    passes everything else to the application's routes
//! 4. **Extractors** verify sessions on application routes
//!
//! # Example
//!
//! ```ignore
//! use axum::{Json, Router, routing::get};
//! use keyward_web::{AuthState, VerifiedSession, with_auth};
//!
//! async fn me(VerifiedSession(session): VerifiedSession) -> Json<Value> {
//!     Json(json!({ "userId": session.user_id() }))
//! }
//!
//! let state = AuthState::new(Arc::new(registry), session_module);
//! let app = with_auth(
//!     Router::new().route("/api/me", get(me)).with_state(state.clone()),
//!     state,
//! )?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn_with_state,
};
use keyward_core::{ConfigError, Registry};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use error::AppError;
pub use extractors::{CorrelationId, OptionalSession, VerifiedSession};
pub use middleware::{
    CORRELATION_ID_HEADER, CorrelationIdExt, auth_middleware, correlation_id_layer, into_http_response,
};
pub use state::AuthState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// CORS policy for the website origin.
///
/// Credentials are allowed so the session cookies travel; the allowed
/// request headers are the registry's CORS headers plus `Content-Type`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if the website domain is not a valid
/// header value.
pub fn cors_layer(registry: &Registry) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(&registry.app_info().website_domain)
        .map_err(|_| ConfigError::Invalid("website_domain is not a valid origin".into()))?;

    let mut headers = vec![header::CONTENT_TYPE];
    for name in registry.cors_headers() {
        match HeaderName::try_from(name.as_str()) {
            Ok(name) => headers.push(name),
            Err(_) => tracing::warn!(header = %name, "Skipping invalid CORS header"),
        }
    }

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(headers))
}

/// Wrap an application router with the auth middleware and the ambient
/// layers (CORS, request tracing, correlation ids).
///
/// Call this after every route and fallback has been added.
///
/// # Errors
///
/// Fails when the CORS layer cannot be built (see [`cors_layer`]).
pub fn with_auth(router: Router, state: AuthState) -> Result<Router, ConfigError> {
    let cors = cors_layer(&state.registry)?;
    Ok(router
        .layer(from_fn_with_state(state, auth_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer()))
}
