//! Strict `Set-Cookie` parsing for tests.
//!
//! Attributes are recognised by name, case-insensitively, in any order.
//! Unknown attributes and malformed dates are errors rather than being
//! silently skipped, so a test cannot pass by accident.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use http::header::{self, HeaderMap, HeaderValue};
use keyward_core::SameSite;
use thiserror::Error;

/// Name of the access token cookie.
pub const ACCESS_TOKEN: &str = "sAccessToken";
/// Name of the refresh token cookie.
pub const REFRESH_TOKEN: &str = "sRefreshToken";
/// Name of the id-refresh token cookie.
pub const ID_REFRESH_TOKEN: &str = "sIdRefreshToken";
/// Response/request header carrying the anti-CSRF token.
pub const ANTI_CSRF_HEADER: &str = "anti-csrf";
/// Response header carrying the front token.
pub const FRONT_TOKEN_HEADER: &str = "front-token";

/// Why a `Set-Cookie` value was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CookieParseError {
    /// No `name=value` pair at the start.
    #[error("missing name=value pair in `{0}`")]
    MissingPair(String),

    /// An attribute this parser does not know.
    #[error("unknown cookie attribute `{0}`")]
    UnknownAttribute(String),

    /// An attribute given twice.
    #[error("duplicate cookie attribute `{0}`")]
    DuplicateAttribute(String),

    /// `Expires` is not an HTTP date.
    #[error("invalid Expires date `{0}`")]
    InvalidExpires(String),

    /// `SameSite` is not Strict, Lax or None.
    #[error("invalid SameSite value `{0}`")]
    InvalidSameSite(String),

    /// A header value that is not valid UTF-8.
    #[error("Set-Cookie header is not valid UTF-8")]
    NotUtf8,

    /// An expected cookie or header is absent.
    #[error("missing `{0}` in response")]
    Missing(&'static str),
}

/// A fully parsed `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCookie {
    /// Cookie name.
    pub name: String,
    /// URL-decoded value.
    pub value: String,
    /// `Expires`, if present.
    pub expires: Option<DateTime<Utc>>,
    /// `Domain`, if present.
    pub domain: Option<String>,
    /// `Path`, if present.
    pub path: Option<String>,
    /// `HttpOnly` flag.
    pub http_only: bool,
    /// `Secure` flag.
    pub secure: bool,
    /// `SameSite`, if present.
    pub same_site: Option<SameSite>,
}

impl ParsedCookie {
    /// `true` when the cookie instructs the client to delete it.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.value.is_empty() && self.expires.is_some_and(|e| e.timestamp() <= 0)
    }
}

/// Parse one `Set-Cookie` header value.
///
/// # Errors
///
/// Returns a [`CookieParseError`] for any deviation from the grammar.
///
/// # Examples
///
/// ```
/// use keyward_testing::cookies::parse_set_cookie;
///
/// let a = parse_set_cookie("sAccessToken=abc; Path=/; HttpOnly; SameSite=Lax").unwrap();
/// let b = parse_set_cookie("sAccessToken=abc; samesite=lax; httponly; path=/").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_set_cookie(raw: &str) -> Result<ParsedCookie, CookieParseError> {
    let mut parts = raw.split(';').map(str::trim);
    let pair = parts.next().unwrap_or_default();
    let (name, value) = pair
        .split_once('=')
        .filter(|(name, _)| !name.trim().is_empty())
        .ok_or_else(|| CookieParseError::MissingPair(raw.to_string()))?;

    let mut cookie = ParsedCookie {
        name: name.trim().to_string(),
        value: urlencoding::decode(value.trim())
            .map_or_else(|_| value.trim().to_string(), |v| v.into_owned()),
        expires: None,
        domain: None,
        path: None,
        http_only: false,
        secure: false,
        same_site: None,
    };

    let mut seen = BTreeSet::new();
    for part in parts.filter(|p| !p.is_empty()) {
        let (key, val) = part.split_once('=').map_or((part, None), |(k, v)| (k.trim(), Some(v.trim())));
        let key = key.to_ascii_lowercase();
        if !seen.insert(key.clone()) {
            return Err(CookieParseError::DuplicateAttribute(key));
        }
        match (key.as_str(), val) {
            ("expires", Some(v)) => {
                let parsed = NaiveDateTime::parse_from_str(v, "%a, %d %b %Y %H:%M:%S GMT")
                    .map_err(|_| CookieParseError::InvalidExpires(v.to_string()))?;
                cookie.expires = Some(parsed.and_utc());
            }
            ("domain", Some(v)) => cookie.domain = Some(v.trim_start_matches('.').to_string()),
            ("path", Some(v)) => cookie.path = Some(v.to_string()),
            ("httponly", None) => cookie.http_only = true,
            ("secure", None) => cookie.secure = true,
            ("samesite", Some(v)) => {
                cookie.same_site = Some(match v.to_ascii_lowercase().as_str() {
                    "strict" => SameSite::Strict,
                    "lax" => SameSite::Lax,
                    "none" => SameSite::None,
                    _ => return Err(CookieParseError::InvalidSameSite(v.to_string())),
                });
            }
            // Max-Age is accepted but not modelled
            ("max-age", Some(_)) => {}
            _ => return Err(CookieParseError::UnknownAttribute(part.to_string())),
        }
    }
    Ok(cookie)
}

/// Parse every `Set-Cookie` header of a response, keyed by cookie name.
///
/// # Errors
///
/// Returns the first parse failure.
pub fn parse_response_cookies(
    headers: &HeaderMap,
) -> Result<BTreeMap<String, ParsedCookie>, CookieParseError> {
    let mut cookies = BTreeMap::new();
    for value in headers.get_all(header::SET_COOKIE) {
        let cookie = parse_set_cookie(value.to_str().map_err(|_| CookieParseError::NotUtf8)?)?;
        cookies.insert(cookie.name.clone(), cookie);
    }
    Ok(cookies)
}

/// The session tokens a response handed to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    /// `sAccessToken` value.
    pub access_token: Option<String>,
    /// `sRefreshToken` value.
    pub refresh_token: Option<String>,
    /// `sIdRefreshToken` value.
    pub id_refresh_token: Option<String>,
    /// `anti-csrf` response header.
    pub anti_csrf: Option<String>,
    /// `front-token` response header.
    pub front_token: Option<String>,
}

impl SessionTokens {
    /// Extract tokens from response headers. Removal cookies count as absent.
    ///
    /// # Errors
    ///
    /// Returns a parse failure for malformed `Set-Cookie` headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, CookieParseError> {
        let cookies = parse_response_cookies(headers)?;
        let live = |name: &str| {
            cookies
                .get(name)
                .filter(|c| !c.is_removal())
                .map(|c| c.value.clone())
        };
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);

        Ok(Self {
            access_token: live(ACCESS_TOKEN),
            refresh_token: live(REFRESH_TOKEN),
            id_refresh_token: live(ID_REFRESH_TOKEN),
            anti_csrf: header(ANTI_CSRF_HEADER),
            front_token: header(FRONT_TOKEN_HEADER),
        })
    }

    /// Like [`from_headers`](Self::from_headers) but requires the full cookie triad.
    ///
    /// # Errors
    ///
    /// Returns [`CookieParseError::Missing`] if a cookie is absent.
    pub fn require_triad(headers: &HeaderMap) -> Result<Self, CookieParseError> {
        let tokens = Self::from_headers(headers)?;
        if tokens.access_token.is_none() {
            return Err(CookieParseError::Missing(ACCESS_TOKEN));
        }
        if tokens.refresh_token.is_none() {
            return Err(CookieParseError::Missing(REFRESH_TOKEN));
        }
        if tokens.id_refresh_token.is_none() {
            return Err(CookieParseError::Missing(ID_REFRESH_TOKEN));
        }
        Ok(tokens)
    }

    /// `Cookie` header carrying the access and id-refresh tokens.
    #[must_use]
    pub fn access_cookie_header(&self) -> Option<HeaderValue> {
        cookie_header(&[
            (ACCESS_TOKEN, self.access_token.as_deref()),
            (ID_REFRESH_TOKEN, self.id_refresh_token.as_deref()),
        ])
    }

    /// `Cookie` header carrying the refresh and id-refresh tokens.
    #[must_use]
    pub fn refresh_cookie_header(&self) -> Option<HeaderValue> {
        cookie_header(&[
            (REFRESH_TOKEN, self.refresh_token.as_deref()),
            (ID_REFRESH_TOKEN, self.id_refresh_token.as_deref()),
        ])
    }
}

/// Build a `Cookie` request header from name/value pairs, skipping `None`s.
#[must_use]
pub fn cookie_header(pairs: &[(&str, Option<&str>)]) -> Option<HeaderValue> {
    let joined = pairs
        .iter()
        .filter_map(|(name, value)| value.map(|v| format!("{name}={}", urlencoding::encode(v))))
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() {
        return None;
    }
    HeaderValue::try_from(joined).ok()
}
