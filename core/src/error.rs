//! Error taxonomy for the dispatch engine.
//!
//! Every error raised while routing or handling a request is an [`Error`].
//! Validation errors and session errors are usually turned into responses by
//! the module that owns them (through the error chain); configuration errors
//! are fatal at construction time; upstream errors surface to the transport.

use http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single form field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Id of the offending field.
    pub id: String,

    /// Human readable reason.
    pub error: String,
}

impl FieldError {
    /// Create a new field error.
    #[must_use]
    pub fn new(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: error.into(),
        }
    }
}

/// Top-level error type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════
    // Per-request errors
    // ═══════════════════════════════════════════════════════════

    /// One or more submitted form fields failed validation.
    #[error("form field validation failed for {} field(s)", .0.len())]
    FieldErrors(Vec<FieldError>),

    /// The request was malformed (missing parameters, bad JSON, ...).
    #[error("bad input: {0}")]
    BadInput(String),

    /// Session token problem.
    #[error(transparent)]
    Session(#[from] SessionError),

    // ═══════════════════════════════════════════════════════════
    // Startup / system errors
    // ═══════════════════════════════════════════════════════════

    /// Invalid module composition or configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The external core service failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Internal error (should not be exposed to users).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::BadInput`].
    #[must_use]
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    /// Returns `true` if this error is caused by what the client sent.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keyward_core::Error;
    /// assert!(Error::bad_input("missing formFields").is_client_error());
    /// assert!(!Error::Internal("boom".into()).is_client_error());
    /// ```
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::FieldErrors(_) | Self::BadInput(_) | Self::Session(_))
    }
}

/// Session token failures.
///
/// The three variants are deliberately distinct: the caller must be able to
/// tell "refresh and retry" apart from "sign in again" and from "someone is
/// replaying an old refresh token".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No usable session; the user has to authenticate again.
    #[error("unauthorised: {message}")]
    Unauthorised {
        /// Reason.
        message: String,
        /// Whether the session cookies should be removed from the client.
        clear_cookies: bool,
    },

    /// The access token is missing, expired or failed verification while a
    /// refresh token may still be valid.
    #[error("try refresh token: {message}")]
    TryRefreshToken {
        /// Reason.
        message: String,
    },

    /// A refresh token that was already rotated has been presented again.
    #[error("token theft detected for session {session_handle}")]
    TokenTheftDetected {
        /// Handle of the affected session family.
        session_handle: String,
        /// Owner of the session.
        user_id: String,
    },
}

impl SessionError {
    /// Create an unauthorised error.
    #[must_use]
    pub fn unauthorised(message: impl Into<String>, clear_cookies: bool) -> Self {
        Self::Unauthorised {
            message: message.into(),
            clear_cookies,
        }
    }

    /// Create a try-refresh error.
    #[must_use]
    pub fn try_refresh(message: impl Into<String>) -> Self {
        Self::TryRefreshToken {
            message: message.into(),
        }
    }

    /// `true` when the client should call the refresh endpoint.
    #[must_use]
    pub const fn needs_refresh(&self) -> bool {
        matches!(self, Self::TryRefreshToken { .. })
    }

    /// `true` when the client must sign in again.
    #[must_use]
    pub const fn needs_reauth(&self) -> bool {
        matches!(self, Self::Unauthorised { .. } | Self::TokenTheftDetected { .. })
    }

    /// `true` when refresh-token reuse was detected.
    #[must_use]
    pub const fn is_token_theft(&self) -> bool {
        matches!(self, Self::TokenTheftDetected { .. })
    }
}

/// Configuration and composition errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two modules claim the same `(method, path)`.
    #[error("route {method} {path} is claimed by both `{first}` and `{second}`")]
    DuplicateRoute {
        /// HTTP method.
        method: String,
        /// Path template.
        path: String,
        /// Module registered first.
        first: String,
        /// Module that tried to claim it again.
        second: String,
    },

    /// A module declares the same route id twice.
    #[error("module `{module}` declares route id `{route_id}` more than once")]
    DuplicateRouteId {
        /// Module id.
        module: String,
        /// Route id.
        route_id: String,
    },

    /// A module with this id has already been registered.
    #[error("`{module}` has already been initialised")]
    AlreadyInitialised {
        /// Module id.
        module: String,
    },

    /// A module was looked up before it was registered.
    #[error("`{module}` has not been initialised")]
    NotInitialised {
        /// Module id.
        module: String,
    },

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn duplicate_route(
        method: &Method,
        path: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::DuplicateRoute {
            method: method.to_string(),
            path: path.into(),
            first: first.into(),
            second: second.into(),
        }
    }
}

/// Failures talking to the external core service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The request never produced a response.
    #[error("core service unreachable at {path}: {message}")]
    Transport {
        /// Core API path.
        path: String,
        /// Transport error text.
        message: String,
    },

    /// The core answered with a non-success status.
    #[error("core service returned {status} for {path}: {body}")]
    Status {
        /// Core API path.
        path: String,
        /// HTTP status.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The core answered with something we could not interpret.
    #[error("malformed response from core service at {path}: {message}")]
    Malformed {
        /// Core API path.
        path: String,
        /// Parse error text.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_kinds_are_distinguishable() {
        let refresh = SessionError::try_refresh("expired");
        let unauth = SessionError::unauthorised("no session", false);
        let theft = SessionError::TokenTheftDetected {
            session_handle: "h".into(),
            user_id: "u".into(),
        };

        assert!(refresh.needs_refresh() && !refresh.needs_reauth());
        assert!(unauth.needs_reauth() && !unauth.is_token_theft());
        assert!(theft.is_token_theft() && theft.needs_reauth());
    }

    #[test]
    fn duplicate_route_message_names_both_modules() {
        let err = ConfigError::duplicate_route(&Method::POST, "/signin", "emailpassword", "custom");
        assert_eq!(
            err.to_string(),
            "route POST /signin is claimed by both `emailpassword` and `custom`"
        );
    }

    #[test]
    fn conversions_into_error() {
        let err: Error = ConfigError::Invalid("x".into()).into();
        assert!(matches!(err, Error::Config(_)));
        assert!(!err.is_client_error());
    }
}
