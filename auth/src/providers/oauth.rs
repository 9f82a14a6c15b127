//! Third-party OAuth 2.0 providers.
//!
//! [`ThirdPartyProvider`] is what the third-party module talks to.
//! [`OAuth2Provider`] is a configurable implementation for any provider
//! following the authorization-code flow (endpoints and scopes are supplied
//! by the application).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keyward_core::{Error, RequestContext, Result, UpstreamError};
use reqwest::Client;
use serde_json::Value;

/// Email reported by a provider's profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfoEmail {
    /// Address.
    pub id: String,

    /// Whether the provider vouches for it.
    pub is_verified: bool,
}

/// Normalised provider profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// User id at the provider.
    pub id: String,

    /// Email, when the provider shares one.
    pub email: Option<UserInfoEmail>,
}

/// Closure computing an authorisation parameter from the request.
pub type DynamicParam = dyn Fn(&RequestContext) -> String + Send + Sync;

/// Value of one authorisation URL query parameter.
#[derive(Clone)]
pub enum AuthParam {
    /// Fixed value.
    Static(String),

    /// Computed per request.
    Dynamic(Arc<DynamicParam>),
}

impl AuthParam {
    /// Computed parameter from a closure.
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    fn resolve(&self, ctx: &RequestContext) -> String {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(f) => f(ctx),
        }
    }
}

impl fmt::Debug for AuthParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for AuthParam {
    fn from(value: &str) -> Self {
        Self::Static(value.to_string())
    }
}

/// Build `{url}?{params}`, resolving dynamic parameters against `ctx`.
///
/// # Errors
///
/// Returns [`Error::Internal`] if the query cannot be encoded.
pub fn build_authorisation_url(
    url: &str,
    params: &BTreeMap<String, AuthParam>,
    ctx: &RequestContext,
) -> Result<String> {
    let resolved: Vec<(&str, String)> = params
        .iter()
        .map(|(name, value)| (name.as_str(), value.resolve(ctx)))
        .collect();
    let query = serde_urlencoded::to_string(&resolved)
        .map_err(|e| Error::Internal(format!("Failed to build URL: {e}")))?;
    if query.is_empty() {
        Ok(url.to_string())
    } else {
        Ok(format!("{url}?{query}"))
    }
}

/// An OAuth 2.0 provider usable by the third-party module.
#[async_trait]
pub trait ThirdPartyProvider: Send + Sync {
    /// Provider id, matched against `thirdPartyId` in requests.
    fn id(&self) -> &str;

    /// Authorisation URL the frontend redirects the user to.
    ///
    /// # Errors
    ///
    /// Returns error if URL construction fails.
    fn authorisation_url(&self, ctx: &RequestContext) -> Result<String>;

    /// Exchange the authorisation code; returns the raw token response.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network request fails
    /// - Provider rejects the code
    /// - Response is malformed
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Value>;

    /// Fetch and normalise the user's profile.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network request fails
    /// - Token is invalid
    /// - Response is malformed
    async fn get_profile_info(&self, auth_code_response: &Value) -> Result<UserInfo>;
}

/// Generic authorization-code provider.
///
/// # Example
///
/// ```no_run
/// use keyward_auth::providers::OAuth2Provider;
///
/// let github = OAuth2Provider::new(
///     "github",
///     "client-id",
///     "client-secret",
///     "https://github.com/login/oauth/authorize",
///     "https://github.com/login/oauth/access_token",
///     "https://api.github.com/user",
/// )
/// .with_scopes(vec!["read:user".into(), "user:email".into()])
/// .with_user_id_field("id");
/// ```
#[derive(Clone, Debug)]
pub struct OAuth2Provider {
    id: String,
    client_id: String,
    client_secret: String,
    authorisation_endpoint: String,
    token_endpoint: String,
    user_info_endpoint: String,
    scopes: Vec<String>,
    extra_params: BTreeMap<String, AuthParam>,
    user_id_field: String,
    email_field: String,
    email_verified_field: Option<String>,
    http_client: Client,
}

impl OAuth2Provider {
    /// Create a provider from its endpoints and client credentials.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authorisation_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        user_info_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authorisation_endpoint: authorisation_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            user_info_endpoint: user_info_endpoint.into(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            extra_params: BTreeMap::new(),
            user_id_field: "sub".to_string(),
            email_field: "email".to_string(),
            email_verified_field: Some("email_verified".to_string()),
            http_client: Client::new(),
        }
    }

    /// Set custom scopes.
    ///
    /// Default scopes are: `openid email`
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Add an authorisation URL parameter.
    #[must_use]
    pub fn with_auth_param(mut self, name: impl Into<String>, value: AuthParam) -> Self {
        self.extra_params.insert(name.into(), value);
        self
    }

    /// Profile field holding the user id (default `sub`).
    #[must_use]
    pub fn with_user_id_field(mut self, field: impl Into<String>) -> Self {
        self.user_id_field = field.into();
        self
    }

    /// Profile field holding the email (default `email`).
    #[must_use]
    pub fn with_email_field(mut self, field: impl Into<String>) -> Self {
        self.email_field = field.into();
        self
    }

    /// Profile field holding the verified flag (default `email_verified`);
    /// `None` treats every email as unverified.
    #[must_use]
    pub fn with_email_verified_field(mut self, field: Option<String>) -> Self {
        self.email_verified_field = field;
        self
    }

    /// Use a specific HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    fn upstream(&self, endpoint: &str, message: impl Into<String>) -> Error {
        UpstreamError::Transport {
            path: endpoint.to_string(),
            message: format!("{}: {}", self.id, message.into()),
        }
        .into()
    }
}

#[async_trait]
impl ThirdPartyProvider for OAuth2Provider {
    fn id(&self) -> &str {
        &self.id
    }

    fn authorisation_url(&self, ctx: &RequestContext) -> Result<String> {
        let mut params = self.extra_params.clone();
        params.insert("client_id".into(), self.client_id.as_str().into());
        params.insert("response_type".into(), "code".into());
        if !self.scopes.is_empty() {
            params.insert("scope".into(), AuthParam::Static(self.scopes.join(" ")));
        }
        build_authorisation_url(&self.authorisation_endpoint, &params, ctx)
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Value> {
        let params = [
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .header("accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| self.upstream(&self.token_endpoint, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = %self.id, status, "Token exchange failed: {}", body);
            return Err(UpstreamError::Status {
                path: self.token_endpoint.clone(),
                status,
                body,
            }
            .into());
        }

        response.json::<Value>().await.map_err(|e| {
            UpstreamError::Malformed {
                path: self.token_endpoint.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }

    async fn get_profile_info(&self, auth_code_response: &Value) -> Result<UserInfo> {
        let access_token = auth_code_response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| self.upstream(&self.token_endpoint, "token response has no access_token"))?;

        let response = self
            .http_client
            .get(&self.user_info_endpoint)
            .bearer_auth(access_token)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| self.upstream(&self.user_info_endpoint, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = %self.id, status, "UserInfo request failed: {}", body);
            return Err(UpstreamError::Status {
                path: self.user_info_endpoint.clone(),
                status,
                body,
            }
            .into());
        }

        let profile: Value = response.json().await.map_err(|e| UpstreamError::Malformed {
            path: self.user_info_endpoint.clone(),
            message: e.to_string(),
        })?;
        profile_to_user_info(
            &profile,
            &self.user_id_field,
            &self.email_field,
            self.email_verified_field.as_deref(),
        )
        .ok_or_else(|| {
            UpstreamError::Malformed {
                path: self.user_info_endpoint.clone(),
                message: format!("profile has no `{}` field", self.user_id_field),
            }
            .into()
        })
    }
}

/// Map a raw profile document onto [`UserInfo`]. `None` if the id is absent.
///
/// Numeric ids (GitHub, Facebook) are accepted and stringified.
#[must_use]
pub fn profile_to_user_info(
    profile: &Value,
    id_field: &str,
    email_field: &str,
    verified_field: Option<&str>,
) -> Option<UserInfo> {
    let id = match profile.get(id_field)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let email = profile
        .get(email_field)
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(|e| UserInfoEmail {
            id: e.to_string(),
            is_verified: verified_field
                .and_then(|f| profile.get(f))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    Some(UserInfo { id, email })
}
