//! Error type for the HTTP boundary.
//!
//! Engine errors that no module turned into a response end up here and are
//! mapped onto a status code and a small JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use keyward_core::{Error, SessionError};
use serde::Serialize;
use thiserror::Error;

/// Application error type for handlers and the auth middleware.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AuthState>) -> Result<Json<Value>, AppError> {
///     let module = state.registry.module("session").map_err(keyward_core::Error::from)?;
///     Ok(Json(json!({ "id": module.id() })))
/// }
/// ```
#[derive(Debug, Error)]
#[error("[{code}] {message}")]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    /// Engine error that caused this one. Logged, never sent to the client.
    #[source]
    source: Option<Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the engine error that caused this one.
    #[must_use]
    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorised(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, "UNAUTHORISED")
    }

    /// 413 Payload Too Large.
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message, "PAYLOAD_TOO_LARGE")
    }

    /// 502 Bad Gateway, for a failing core service.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message, "BAD_GATEWAY")
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "{}",
                    self.message
                ),
                None => tracing::error!(status = %self.status, code = self.code, "{}", self.message),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let mapped = match &err {
            Error::BadInput(message) => Self::bad_request(message.clone()),
            Error::FieldErrors(fields) => {
                Self::new(StatusCode::BAD_REQUEST, format!("{} invalid field(s)", fields.len()), "FIELD_ERROR")
            }
            Error::Session(SessionError::TryRefreshToken { .. }) => Self::unauthorised("try refresh token"),
            Error::Session(SessionError::TokenTheftDetected { .. }) => Self::unauthorised("token theft detected"),
            Error::Session(SessionError::Unauthorised { .. }) => Self::unauthorised("unauthorised"),
            Error::Upstream(_) => Self::bad_gateway("The auth core service failed"),
            Error::Config(_) | Error::Internal(_) => Self::internal("An internal error occurred"),
        };
        mapped.with_source(err)
    }
}
