//! Request builders for the standard auth routes.
//!
//! Every builder targets the default `/auth` API base path and returns a
//! [`RequestContext`] ready for `Registry::handle`.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Method;
use keyward_core::RequestContext;
use serde_json::{Value, json};

use crate::cookies::{ANTI_CSRF_HEADER, SessionTokens};

/// Fluent builder for a [`RequestContext`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Option<Value>,
}

impl RequestBuilder {
    /// Start a request.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Add the `rid` header.
    #[must_use]
    pub fn rid(self, rid: &str) -> Self {
        self.header("rid", rid)
    }

    /// Send the access-side cookies (and the anti-CSRF header if known).
    #[must_use]
    pub fn with_access_tokens(mut self, tokens: &SessionTokens) -> Self {
        if let Some(cookie) = tokens.access_cookie_header() {
            self.headers.append(header::COOKIE, cookie);
        }
        match &tokens.anti_csrf {
            Some(csrf) => self.header(ANTI_CSRF_HEADER, csrf),
            None => self,
        }
    }

    /// Send the refresh-side cookies (and the anti-CSRF header if known).
    #[must_use]
    pub fn with_refresh_tokens(mut self, tokens: &SessionTokens) -> Self {
        if let Some(cookie) = tokens.refresh_cookie_header() {
            self.headers.append(header::COOKIE, cookie);
        }
        match &tokens.anti_csrf {
            Some(csrf) => self.header(ANTI_CSRF_HEADER, csrf),
            None => self,
        }
    }

    /// JSON body.
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(body);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> RequestContext {
        let ctx = RequestContext::new(self.method, &self.uri, self.headers);
        match self.body {
            Some(body) => ctx.with_json(&body),
            None => ctx,
        }
    }
}

fn credentials(email: &str, password: &str) -> Value {
    json!({
        "formFields": [
            { "id": "email", "value": email },
            { "id": "password", "value": password }
        ]
    })
}

/// `POST /auth/signup`.
#[must_use]
pub fn sign_up(email: &str, password: &str) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/signup")
        .rid("emailpassword")
        .json(credentials(email, password))
        .build()
}

/// `POST /auth/signin`.
#[must_use]
pub fn sign_in(email: &str, password: &str) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/signin")
        .rid("emailpassword")
        .json(credentials(email, password))
        .build()
}

/// `POST /auth/session/refresh`.
#[must_use]
pub fn refresh(tokens: &SessionTokens) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/session/refresh")
        .rid("session")
        .with_refresh_tokens(tokens)
        .build()
}

/// `POST /auth/signout`.
#[must_use]
pub fn sign_out(tokens: &SessionTokens) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/signout")
        .rid("session")
        .with_access_tokens(tokens)
        .build()
}

/// `POST /auth/user/email/verify/token`.
#[must_use]
pub fn email_verify_token(tokens: &SessionTokens) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/user/email/verify/token")
        .rid("emailverification")
        .with_access_tokens(tokens)
        .build()
}

/// `POST /auth/user/email/verify` with a token from the verification link.
#[must_use]
pub fn verify_email(token: &str) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/user/email/verify")
        .rid("emailverification")
        .json(json!({ "method": "token", "token": token }))
        .build()
}

/// `POST /auth/signinup` for a third-party provider.
#[must_use]
pub fn third_party_sign_in_up(provider: &str, code: &str, redirect_uri: &str) -> RequestContext {
    RequestBuilder::new(Method::POST, "/auth/signinup")
        .rid("thirdparty")
        .json(json!({ "thirdPartyId": provider, "code": code, "redirectURI": redirect_uri }))
        .build()
}
