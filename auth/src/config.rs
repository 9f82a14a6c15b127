//! Session configuration.
//!
//! Configuration values are provided by the application and normalised once
//! when the session module is built. Other modules carry their own config
//! next to their code.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use http::StatusCode;
use keyward_core::{AppInfo, Clock, ConfigError, OverrideConfig, SameSite, SystemClock};

use crate::session::{SessionApi, SessionErrorHandler, SessionRecipe};

/// How state-changing requests are protected against CSRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AntiCsrf {
    /// A token is issued with the session and must be echoed in the
    /// `anti-csrf` request header.
    ViaToken,

    /// Requests must carry a custom header (`rid`), which browsers will not
    /// attach cross-origin without a preflight.
    ViaCustomHeader,

    /// No check.
    None,
}

impl AntiCsrf {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ViaToken => "VIA_TOKEN",
            Self::ViaCustomHeader => "VIA_CUSTOM_HEADER",
            Self::None => "NONE",
        }
    }
}

/// Session module configuration.
///
/// # Example
///
/// ```
/// use keyward_auth::config::{AntiCsrf, SessionConfig};
/// use keyward_core::SameSite;
///
/// let config = SessionConfig::new()
///     .with_cookie_domain(".example.com")
///     .with_cookie_same_site(SameSite::None)
///     .with_cookie_secure(true)
///     .with_anti_csrf(AntiCsrf::ViaToken);
/// # let _ = config;
/// ```
pub struct SessionConfig {
    /// `Domain` attribute of the session cookies.
    pub cookie_domain: Option<String>,

    /// `Secure` attribute. Defaults to whether the API is served over HTTPS.
    pub cookie_secure: Option<bool>,

    /// `SameSite` attribute.
    ///
    /// Default: `Lax`
    pub cookie_same_site: SameSite,

    /// Anti-CSRF mode. Defaults to `ViaCustomHeader` when `SameSite=None`,
    /// otherwise `None`.
    pub anti_csrf: Option<AntiCsrf>,

    /// `Path` of the refresh cookie. Defaults to
    /// `{api_base_path}/session/refresh`.
    pub refresh_token_path: Option<String>,

    /// Status used for unauthorised and try-refresh responses.
    ///
    /// Default: 401
    pub session_expired_status_code: StatusCode,

    /// Tolerated clock difference when checking access token expiry.
    ///
    /// Default: zero
    pub clock_skew: Duration,

    /// Replacement for the default session error responses.
    pub error_handler: Option<Arc<dyn SessionErrorHandler>>,

    /// Behavior and API overrides.
    pub overrides: OverrideConfig<dyn SessionRecipe, dyn SessionApi>,

    /// Time source for expiry checks.
    pub clock: Arc<dyn Clock>,
}

impl SessionConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_domain: None,
            cookie_secure: None,
            cookie_same_site: SameSite::Lax,
            anti_csrf: None,
            refresh_token_path: None,
            session_expired_status_code: StatusCode::UNAUTHORIZED,
            clock_skew: Duration::zero(),
            error_handler: None,
            overrides: OverrideConfig::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the cookie domain.
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.cookie_domain = Some(domain.into());
        self
    }

    /// Set the `Secure` attribute explicitly.
    #[must_use]
    pub const fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = Some(secure);
        self
    }

    /// Set the `SameSite` attribute.
    #[must_use]
    pub const fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    /// Set the anti-CSRF mode.
    #[must_use]
    pub const fn with_anti_csrf(mut self, mode: AntiCsrf) -> Self {
        self.anti_csrf = Some(mode);
        self
    }

    /// Set the refresh cookie path.
    #[must_use]
    pub fn with_refresh_token_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_token_path = Some(path.into());
        self
    }

    /// Set the status used for session errors.
    #[must_use]
    pub const fn with_session_expired_status_code(mut self, status: StatusCode) -> Self {
        self.session_expired_status_code = status;
        self
    }

    /// Set the tolerated clock skew.
    #[must_use]
    pub const fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Replace the session error handler.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn SessionErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Set behavior and API overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: OverrideConfig<dyn SessionRecipe, dyn SessionApi>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Use a specific clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Resolve defaults against `app_info` (which must be normalised).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for `SameSite=None` without secure
    /// cookies, a negative clock skew or a non-error status code.
    pub fn settings(&self, app_info: &AppInfo) -> Result<SessionSettings, ConfigError> {
        let cookie_secure = self
            .cookie_secure
            .unwrap_or_else(|| app_info.api_domain.starts_with("https://"));
        if self.cookie_same_site == SameSite::None && !cookie_secure {
            return Err(ConfigError::Invalid(
                "SameSite=None requires secure session cookies".into(),
            ));
        }
        if self.clock_skew < Duration::zero() {
            return Err(ConfigError::Invalid("clock_skew must not be negative".into()));
        }
        if !self.session_expired_status_code.is_client_error() {
            return Err(ConfigError::Invalid(format!(
                "session_expired_status_code must be a 4xx status, got {}",
                self.session_expired_status_code
            )));
        }

        let anti_csrf = self.anti_csrf.unwrap_or(if self.cookie_same_site == SameSite::None {
            AntiCsrf::ViaCustomHeader
        } else {
            AntiCsrf::None
        });
        let refresh_token_path = self.refresh_token_path.as_deref().map_or_else(
            || format!("{}/session/refresh", app_info.api_base_path),
            keyward_core::route::normalise_path,
        );
        let cookie_domain = self
            .cookie_domain
            .as_deref()
            .map(normalise_cookie_domain)
            .transpose()?;

        Ok(SessionSettings {
            cookie_domain,
            cookie_secure,
            cookie_same_site: self.cookie_same_site,
            anti_csrf,
            refresh_token_path,
            session_expired_status_code: self.session_expired_status_code,
            clock_skew: self.clock_skew,
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_domain", &self.cookie_domain)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_same_site", &self.cookie_same_site)
            .field("anti_csrf", &self.anti_csrf)
            .field("refresh_token_path", &self.refresh_token_path)
            .field("session_expired_status_code", &self.session_expired_status_code)
            .field("clock_skew", &self.clock_skew)
            .field("error_handler", &self.error_handler.is_some())
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

fn normalise_cookie_domain(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(&trimmed);
    let host = without_scheme
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    if host.is_empty() {
        return Err(ConfigError::Invalid(format!("invalid cookie domain `{raw}`")));
    }
    Ok(host.to_string())
}

/// Normalised session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// `Domain` of the session cookies.
    pub cookie_domain: Option<String>,
    /// `Secure` of the session cookies.
    pub cookie_secure: bool,
    /// `SameSite` of the session cookies.
    pub cookie_same_site: SameSite,
    /// Resolved anti-CSRF mode.
    pub anti_csrf: AntiCsrf,
    /// `Path` of the refresh cookie.
    pub refresh_token_path: String,
    /// Status for session errors.
    pub session_expired_status_code: StatusCode,
    /// Tolerated clock skew.
    pub clock_skew: Duration,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn app_info(api_domain: &str) -> AppInfo {
        AppInfo::new("demo", api_domain, "example.com").normalised().unwrap()
    }

    #[test]
    fn defaults_follow_api_domain_and_base_path() {
        let settings = SessionConfig::new()
            .settings(&app_info("http://localhost:3001"))
            .unwrap();
        assert!(!settings.cookie_secure);
        assert_eq!(settings.anti_csrf, AntiCsrf::None);
        assert_eq!(settings.refresh_token_path, "/auth/session/refresh");
        assert_eq!(settings.session_expired_status_code, StatusCode::UNAUTHORIZED);

        let settings = SessionConfig::new().settings(&app_info("api.example.com")).unwrap();
        assert!(settings.cookie_secure);
    }

    #[test]
    fn same_site_none_defaults_to_custom_header() {
        let settings = SessionConfig::new()
            .with_cookie_same_site(SameSite::None)
            .settings(&app_info("https://api.example.com"))
            .unwrap();
        assert_eq!(settings.anti_csrf, AntiCsrf::ViaCustomHeader);
    }

    #[test]
    fn same_site_none_requires_secure() {
        let err = SessionConfig::new()
            .with_cookie_same_site(SameSite::None)
            .with_cookie_secure(false)
            .settings(&app_info("https://api.example.com"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn cookie_domain_is_normalised() {
        let settings = SessionConfig::new()
            .with_cookie_domain("https://Example.COM:8080/")
            .settings(&app_info("https://api.example.com"))
            .unwrap();
        assert_eq!(settings.cookie_domain.as_deref(), Some("example.com"));
    }
}
