//! Axum middleware: correlation ids and the auth route handler.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state};
//! use keyward_web::middleware::{auth_middleware, correlation_id_layer};
//!
//! let app = Router::new()
//!     .route("/api/orders", get(list_orders))
//!     .layer(from_fn_with_state(state, auth_middleware))
//!     .layer(correlation_id_layer());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{HeaderValue, Uri, uri::PathAndQuery},
    middleware::Next,
    response::{IntoResponse, Response},
};
use keyward_core::{AuthResponse, RequestContext};
use serde_json::Value;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AuthState;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Key under which the correlation id is placed in the request's user context.
pub const CORRELATION_ID_CONTEXT_KEY: &str = "correlationId";

/// Largest request body the auth routes accept.
pub const MAX_AUTH_BODY_BYTES: usize = 64 * 1024;

/// Create a layer that adds correlation ID tracking to all requests.
///
/// The id comes from the `X-Correlation-ID` request header when it is a
/// valid UUID, otherwise a new one is generated. It is stored in the request
/// extensions, recorded on an `http_request` span and echoed back on the
/// response.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Copy, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(correlation_id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// Extension trait for reading the correlation id placed by
/// [`correlation_id_layer`].
pub trait CorrelationIdExt {
    /// The correlation id, or `None` if the layer is not installed.
    fn correlation_id(&self) -> Option<Uuid>;
}

impl CorrelationIdExt for Request {
    fn correlation_id(&self) -> Option<Uuid> {
        self.extensions().get::<Uuid>().copied()
    }
}

/// Serve every request some auth module owns; pass the rest to `next`.
///
/// Owned requests are converted into a [`RequestContext`], run through
/// `Registry::handle` (dispatch plus error chain) and the resulting
/// [`AuthResponse`] is written back as-is. Requests outside the API base path
/// or without an owning route never reach the engine.
///
/// # Errors
///
/// Returns an [`AppError`] when the body cannot be read or no module turned
/// the engine error into a response.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let correlation_id = request.correlation_id();
    let (parts, body) = request.into_parts();
    let ctx = RequestContext::new(parts.method.clone(), request_target(&parts.uri), parts.headers.clone());

    let Some(owner) = state.registry.resolve(ctx.path(), ctx.method()) else {
        return Ok(next.run(Request::from_parts(parts, body)).await);
    };
    tracing::debug!(
        module = owner.module.id(),
        route_id = %owner.route_id,
        "Auth route matched"
    );

    let bytes = body::to_bytes(body, MAX_AUTH_BODY_BYTES)
        .await
        .map_err(|e| AppError::payload_too_large(format!("Could not read request body: {e}")))?;
    let mut ctx = ctx.with_body(bytes);
    if let Some(id) = correlation_id {
        ctx.user_context_mut()
            .insert(CORRELATION_ID_CONTEXT_KEY.to_string(), Value::String(id.to_string()));
    }

    let response = state.registry.handle(ctx).await?;
    Ok(into_http_response(response))
}

/// Path plus query string of a request URI.
pub(crate) fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map_or_else(|| uri.path(), PathAndQuery::as_str)
}

/// Convert an engine response into an axum response. Every header is kept,
/// including repeated `Set-Cookie` values.
#[must_use]
pub fn into_http_response(response: AuthResponse) -> Response {
    let AuthResponse { status, headers, body } = response;
    let mut out = match body {
        Some(json) => axum::Json(json).into_response(),
        None => Body::empty().into_response(),
    };
    *out.status_mut() = status;
    out.headers_mut().extend(headers);
    out
}
