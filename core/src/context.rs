//! Framework-agnostic request/response context.
//!
//! The transport adapter converts its native request into a
//! [`RequestContext`], the dispatcher hands it to the owning module, and the
//! module writes cookies and headers into it while producing a [`Reply`].
//! [`RequestContext::into_response`] then folds both into an [`AuthResponse`].

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::route::normalise_path;

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    #[default]
    Lax,
    /// `SameSite=None` (requires `Secure`)
    None,
}

impl SameSite {
    /// Attribute value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cookie to be written with `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (written URL-encoded).
    pub value: String,
    /// Absolute expiry.
    pub expires: DateTime<Utc>,
    /// `Domain` attribute.
    pub domain: Option<String>,
    /// `Path` attribute.
    pub path: String,
    /// `HttpOnly` attribute.
    pub http_only: bool,
    /// `Secure` attribute.
    pub secure: bool,
    /// `SameSite` attribute.
    pub same_site: SameSite,
}

impl SetCookie {
    /// Render the `Set-Cookie` header value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use chrono::{TimeZone, Utc};
    /// # use keyward_core::context::{SameSite, SetCookie};
    /// let cookie = SetCookie {
    ///     name: "sAccessToken".into(),
    ///     value: "abc".into(),
    ///     expires: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
    ///     domain: None,
    ///     path: "/".into(),
    ///     http_only: true,
    ///     secure: false,
    ///     same_site: SameSite::Lax,
    /// };
    /// assert_eq!(
    ///     cookie.to_header_value(),
    ///     "sAccessToken=abc; Expires=Tue, 01 Jan 2030 00:00:00 GMT; Path=/; HttpOnly; SameSite=Lax"
    /// );
    /// ```
    #[must_use]
    pub fn to_header_value(&self) -> String {
        let mut out = format!(
            "{}={}; Expires={}; Path={}",
            self.name,
            urlencoding::encode(&self.value),
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT"),
            self.path,
        );
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out.push_str("; SameSite=");
        out.push_str(self.same_site.as_str());
        out
    }
}

/// What a handler returns: a status and an optional JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// HTTP status.
    pub status: StatusCode,
    /// JSON body, `None` for an empty response.
    pub body: Option<Value>,
}

impl Reply {
    /// `200 OK` with a JSON body.
    #[must_use]
    pub const fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
        }
    }

    /// `200 OK` without a body.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
        }
    }

    /// Arbitrary status with a JSON body.
    #[must_use]
    pub const fn with_status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    /// `{"message": ...}` with the given status.
    #[must_use]
    pub fn message(status: StatusCode, message: &str) -> Self {
        Self::with_status(status, serde_json::json!({ "message": message }))
    }
}

/// Final response produced by the engine.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers, including `Set-Cookie`.
    pub headers: HeaderMap,
    /// JSON body.
    pub body: Option<Value>,
}

/// Everything a module can see about one request, plus the response
/// side-channel for cookies and headers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    query: BTreeMap<String, String>,
    headers: HeaderMap,
    cookies: BTreeMap<String, String>,
    body: Bytes,
    response_headers: HeaderMap,
    response_cookies: Vec<SetCookie>,
    exposed_headers: Vec<String>,
    user_context: Map<String, Value>,
}

impl RequestContext {
    /// Build a context from a request line and headers.
    ///
    /// `uri` may carry a query string; cookies are read from every `Cookie`
    /// header.
    #[must_use]
    pub fn new(method: Method, uri: &str, headers: HeaderMap) -> Self {
        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        let query = serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .unwrap_or_default()
            .into_iter()
            .collect();
        let cookies = parse_cookie_headers(&headers);

        Self {
            method,
            path: normalise_path(path),
            query,
            headers,
            cookies,
            body: Bytes::new(),
            response_headers: HeaderMap::new(),
            response_cookies: Vec::new(),
            exposed_headers: Vec::new(),
            user_context: Map::new(),
        }
    }

    /// Attach a request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_json(self, body: &Value) -> Self {
        self.with_body(body.to_string())
    }

    /// Seed the per-request user context.
    #[must_use]
    pub fn with_user_context(mut self, user_context: Map<String, Value>) -> Self {
        self.user_context = user_context;
        self
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Normalised request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] when the body is empty or not valid JSON
    /// for `T`.
    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        if self.body.is_empty() {
            return Err(Error::bad_input("Please send a JSON body"));
        }
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::bad_input(format!("Invalid JSON body: {e}")))
    }

    /// Query parameter by name.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Request header by name (first value, must be valid UTF-8).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request cookie by name (URL-decoded).
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Queue a `Set-Cookie`. A later cookie with the same name and path
    /// replaces an earlier one.
    pub fn set_cookie(&mut self, cookie: SetCookie) {
        self.response_cookies
            .retain(|c| !(c.name == cookie.name && c.path == cookie.path));
        self.response_cookies.push(cookie);
    }

    /// Set (replace) a response header. Invalid names or values are logged
    /// and skipped.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.response_headers.insert(name, value);
            }
            _ => tracing::warn!(header = name, "Dropping invalid response header"),
        }
    }

    /// Add a header name to `Access-Control-Expose-Headers`.
    pub fn expose_header(&mut self, name: &str) {
        if !self.exposed_headers.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            self.exposed_headers.push(name.to_string());
        }
    }

    /// Response headers written so far.
    #[must_use]
    pub const fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Cookies queued so far.
    #[must_use]
    pub fn response_cookies(&self) -> &[SetCookie] {
        &self.response_cookies
    }

    /// Per-request scratch space passed through every layer.
    #[must_use]
    pub const fn user_context(&self) -> &Map<String, Value> {
        &self.user_context
    }

    /// Mutable per-request scratch space.
    pub fn user_context_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.user_context
    }

    /// Fold the reply, cookies and headers into the final response.
    #[must_use]
    pub fn into_response(self, reply: Reply) -> AuthResponse {
        let mut headers = self.response_headers;
        for cookie in &self.response_cookies {
            if let Ok(value) = HeaderValue::try_from(cookie.to_header_value()) {
                headers.append(header::SET_COOKIE, value);
            }
        }
        if !self.exposed_headers.is_empty() {
            if let Ok(value) = HeaderValue::try_from(self.exposed_headers.join(", ")) {
                headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
            }
        }
        if reply.body.is_some() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            );
        }
        AuthResponse {
            status: reply.status,
            headers,
            body: reply.body,
        }
    }
}

/// Parse every `Cookie` header into a name → value map.
///
/// Pairs are split on `;`, whitespace trimmed, values URL-decoded. Malformed
/// pairs are skipped; the first occurrence of a name wins.
fn parse_cookie_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((name, raw)) = pair.trim().split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let raw = raw.trim().trim_matches('"');
            let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |v| v.into_owned());
            cookies.entry(name.to_string()).or_insert(decoded);
        }
    }
    cookies
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn parses_path_query_and_cookies() {
        let ctx = RequestContext::new(
            Method::GET,
            "/auth/signup/email/exists/?email=a%40b.com",
            headers(&[
                ("cookie", "sAccessToken=abc%3D; other = x"),
                ("cookie", "sIdRefreshToken=id"),
            ]),
        );
        assert_eq!(ctx.path(), "/auth/signup/email/exists");
        assert_eq!(ctx.query("email"), Some("a@b.com"));
        assert_eq!(ctx.cookie("sAccessToken"), Some("abc="));
        assert_eq!(ctx.cookie("other"), Some("x"));
        assert_eq!(ctx.cookie("sIdRefreshToken"), Some("id"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn json_body_errors_are_bad_input() {
        let ctx = RequestContext::new(Method::POST, "/x", HeaderMap::new());
        assert!(matches!(ctx.json_body::<Value>(), Err(Error::BadInput(_))));

        let ctx = ctx.with_body("{not json");
        assert!(matches!(ctx.json_body::<Value>(), Err(Error::BadInput(_))));
    }

    #[test]
    fn response_collects_cookies_and_exposed_headers() {
        let mut ctx = RequestContext::new(Method::POST, "/x", HeaderMap::new());
        let cookie = SetCookie {
            name: "a".into(),
            value: "1".into(),
            expires: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            domain: Some("example.com".into()),
            path: "/".into(),
            http_only: true,
            secure: true,
            same_site: SameSite::None,
        };
        ctx.set_cookie(cookie.clone());
        ctx.set_cookie(SetCookie {
            value: "2".into(),
            ..cookie
        });
        ctx.set_header("front-token", "ft");
        ctx.expose_header("front-token");
        ctx.expose_header("Front-Token");

        let response = ctx.into_response(Reply::json(json!({"status": "OK"})));
        let set_cookies: Vec<_> = response.headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(set_cookies.len(), 1);
        assert!(set_cookies[0].to_str().unwrap().starts_with("a=2;"));
        assert_eq!(response.headers["front-token"], "ft");
        assert_eq!(response.headers[header::ACCESS_CONTROL_EXPOSE_HEADERS], "front-token");
    }
}
