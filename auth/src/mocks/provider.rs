//! Mock third-party provider for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use keyward_core::{RequestContext, Result, UpstreamError};
use serde_json::{Value, json};

use crate::providers::{ThirdPartyProvider, UserInfo, UserInfoEmail};

/// Provider that knows a fixed set of authorisation codes.
///
/// `exchange_code` fails with a 400 for unknown codes, like a real provider
/// rejecting an expired code.
#[derive(Debug, Clone)]
pub struct MockProvider {
    id: String,
    profiles: HashMap<String, UserInfo>,
}

impl MockProvider {
    /// Provider with no known codes.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            profiles: HashMap::new(),
        }
    }

    /// Accept `code` and return a profile with the given id and email.
    #[must_use]
    pub fn with_user(
        mut self,
        code: impl Into<String>,
        user_id: impl Into<String>,
        email: Option<(&str, bool)>,
    ) -> Self {
        self.profiles.insert(
            code.into(),
            UserInfo {
                id: user_id.into(),
                email: email.map(|(id, is_verified)| UserInfoEmail {
                    id: id.to_string(),
                    is_verified,
                }),
            },
        );
        self
    }
}

#[async_trait]
impl ThirdPartyProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn authorisation_url(&self, _ctx: &RequestContext) -> Result<String> {
        Ok(format!("https://{}.example/authorize?client_id=mock&response_type=code", self.id))
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<Value> {
        if !self.profiles.contains_key(code) {
            return Err(UpstreamError::Status {
                path: format!("https://{}.example/token", self.id),
                status: 400,
                body: r#"{"error":"invalid_grant"}"#.to_string(),
            }
            .into());
        }
        Ok(json!({
            "access_token": code,
            "token_type": "bearer",
            "redirect_uri": redirect_uri,
        }))
    }

    async fn get_profile_info(&self, auth_code_response: &Value) -> Result<UserInfo> {
        auth_code_response
            .get("access_token")
            .and_then(Value::as_str)
            .and_then(|token| self.profiles.get(token))
            .cloned()
            .ok_or_else(|| {
                UpstreamError::Malformed {
                    path: format!("https://{}.example/me", self.id),
                    message: "unknown access token".to_string(),
                }
                .into()
            })
    }
}
