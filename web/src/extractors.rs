//! Custom Axum extractors.
//!
//! - `VerifiedSession`: the caller's verified session, or the standard
//!   session error response
//! - `OptionalSession`: like `VerifiedSession` but a missing session is fine
//! - `CorrelationId`: the request's correlation id
//!
//! # Examples
//!
//! ```ignore
//! async fn list_orders(
//!     VerifiedSession(session): VerifiedSession,
//!     correlation_id: CorrelationId,
//! ) -> Json<Value> {
//!     tracing::info!(correlation_id = %correlation_id.0, user_id = session.user_id(), "Listing orders");
//!     Json(json!({ "userId": session.user_id() }))
//! }
//! ```

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use keyward_auth::session::{SessionContainer, VerifySessionOptions};
use keyward_core::{Error, RequestContext, SessionError};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{CORRELATION_ID_HEADER, into_http_response, request_target};
use crate::state::AuthState;

/// A verified session.
///
/// Rejects with whatever the session module's error handler produces
/// (`401 {"message":"try refresh token"}` and friends, including cookie
/// removal where needed).
pub struct VerifiedSession(pub SessionContainer);

#[async_trait]
impl<S> FromRequestParts<S> for VerifiedSession
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let mut ctx = context_of(parts);
        match state
            .session
            .verify_session(&mut ctx, &VerifySessionOptions::required())
            .await
        {
            Ok(Some(session)) => Ok(Self(session)),
            Ok(None) => {
                let err = SessionError::unauthorised("Session required", false).into();
                Err(reject(&state, err, ctx).await)
            }
            Err(err) => Err(reject(&state, err, ctx).await),
        }
    }
}

/// A session if the request carries one.
///
/// Still rejects when tokens are present but invalid or expired.
pub struct OptionalSession(pub Option<SessionContainer>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalSession
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AuthState::from_ref(state);
        let mut ctx = context_of(parts);
        match state
            .session
            .verify_session(&mut ctx, &VerifySessionOptions::optional())
            .await
        {
            Ok(session) => Ok(Self(session)),
            Err(err) => Err(reject(&state, err, ctx).await),
        }
    }
}

fn context_of(parts: &Parts) -> RequestContext {
    RequestContext::new(parts.method.clone(), request_target(&parts.uri), parts.headers.clone())
}

async fn reject(state: &AuthState, err: Error, ctx: RequestContext) -> Response {
    match state.registry.handle_error(err, ctx).await {
        Ok(response) => into_http_response(response),
        Err(err) => AppError::from(err).into_response(),
    }
}

/// Correlation ID for request tracing.
///
/// Taken from the request extensions when the correlation layer is
/// installed, else from the `X-Correlation-ID` header, else freshly generated.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts.extensions.get::<Uuid>().copied().unwrap_or_else(|| {
            parts
                .headers
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or_else(Uuid::new_v4)
        });

        Ok(Self(correlation_id))
    }
}
