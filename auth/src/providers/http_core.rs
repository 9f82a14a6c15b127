//! Core service client over HTTP.
//!
//! Every call is JSON over HTTP with a `cdi-version` header and, when
//! configured, an `api-key` header. Transport failures, non-2xx statuses and
//! bodies that do not match the expected shape all become
//! [`UpstreamError`]s; nothing is retried.

use async_trait::async_trait;
use keyward_core::{Error, Result, SessionError, UpstreamError};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{
    CreateEmailVerificationTokenResult, CreateResetTokenResult, CreatedSession, EmailPasswordCore,
    EmailVerificationCore, OpenIdCore, ProviderEmail, ResetPasswordResult, SessionCore,
    SessionHandleInfo, SessionInformation, SignInResult, SignInUpResult, SignUpResult, SigningKey,
    ThirdPartyCore, User, VerifiedAccess, VerifyEmailResult,
};

/// Protocol version sent to the core service.
pub const CDI_VERSION: &str = "2.9";

/// Core service client.
#[derive(Clone, Debug)]
pub struct HttpCore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCore {
    /// Client for the core at `base_url` (e.g. `http://localhost:3567`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Send `api-key` with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Use a specific HTTP client.
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<Value> {
        let mut request = self
            .client
            .request(method.clone(), format!("{}{path}", self.base_url))
            .header("cdi-version", CDI_VERSION);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        tracing::debug!(%method, path, "Calling core service");
        let response = request.send().await.map_err(|e| UpstreamError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(path, status = status.as_u16(), "Core service error: {}", body);
            return Err(UpstreamError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        response.json::<Value>().await.map_err(|e| {
            UpstreamError::Malformed {
                path: path.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        self.call(Method::GET, path, query, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.call(Method::POST, path, &[], Some(body)).await
    }

    async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.call(Method::PUT, path, &[], Some(body)).await
    }
}

fn status(value: &Value) -> &str {
    value.get("status").and_then(Value::as_str).unwrap_or_default()
}

fn malformed(path: &str, message: impl Into<String>) -> Error {
    UpstreamError::Malformed {
        path: path.to_string(),
        message: message.into(),
    }
    .into()
}

fn unexpected_status(path: &str, value: &Value) -> Error {
    malformed(path, format!("unexpected status `{}`", status(value)))
}

fn parse<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| malformed(path, e.to_string()))
}

fn field<T: DeserializeOwned>(path: &str, value: &Value, name: &str) -> Result<T> {
    let raw = value
        .get(name)
        .cloned()
        .ok_or_else(|| malformed(path, format!("missing `{name}`")))?;
    parse(path, raw)
}

fn message(value: &Value) -> String {
    value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl SessionCore for HttpCore {
    async fn create_session(
        &self,
        user_id: &str,
        access_token_payload: Value,
        session_data: Value,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession> {
        const PATH: &str = "/recipe/session";
        let body = json!({
            "userId": user_id,
            "userDataInJWT": access_token_payload,
            "userDataInDatabase": session_data,
            "enableAntiCsrf": enable_anti_csrf,
        });
        let value = self.post(PATH, body).await?;
        match status(&value) {
            "OK" => parse(PATH, value),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn verify_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
    ) -> Result<VerifiedAccess> {
        const PATH: &str = "/recipe/session/verify";
        let body = json!({
            "accessToken": access_token,
            "antiCsrfToken": anti_csrf_token,
            "doAntiCsrfCheck": do_anti_csrf_check,
            "enableAntiCsrf": do_anti_csrf_check,
        });
        let value = self.post(PATH, body).await?;
        match status(&value) {
            "OK" => parse(PATH, value),
            "UNAUTHORISED" => Err(SessionError::unauthorised(message(&value), true).into()),
            "TRY_REFRESH_TOKEN" => Err(SessionError::try_refresh(message(&value)).into()),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession> {
        const PATH: &str = "/recipe/session/refresh";
        let body = json!({
            "refreshToken": refresh_token,
            "antiCsrfToken": anti_csrf_token,
            "enableAntiCsrf": enable_anti_csrf,
        });
        let value = self.post(PATH, body).await?;
        match status(&value) {
            "OK" => parse(PATH, value),
            "UNAUTHORISED" => Err(SessionError::unauthorised(message(&value), true).into()),
            "TOKEN_THEFT_DETECTED" => {
                let session: SessionHandleInfo = field(PATH, &value, "session")?;
                Err(SessionError::TokenTheftDetected {
                    session_handle: session.handle,
                    user_id: session.user_id,
                }
                .into())
            }
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn revoke_sessions(&self, session_handles: &[String]) -> Result<Vec<String>> {
        const PATH: &str = "/recipe/session/remove";
        let value = self.post(PATH, json!({ "sessionHandles": session_handles })).await?;
        field(PATH, &value, "sessionHandlesRevoked")
    }

    async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        const PATH: &str = "/recipe/session/remove";
        let value = self.post(PATH, json!({ "userId": user_id })).await?;
        field(PATH, &value, "sessionHandlesRevoked")
    }

    async fn get_session_information(&self, session_handle: &str) -> Result<Option<SessionInformation>> {
        const PATH: &str = "/recipe/session";
        let value = self.get(PATH, &[("sessionHandle", session_handle)]).await?;
        match status(&value) {
            "OK" => {
                let mut value = value;
                if let Some(obj) = value.as_object_mut() {
                    obj.entry("sessionHandle").or_insert_with(|| json!(session_handle));
                }
                parse(PATH, value).map(Some)
            }
            "UNAUTHORISED" => Ok(None),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn update_session_data(&self, session_handle: &str, data: Value) -> Result<bool> {
        const PATH: &str = "/recipe/session/data";
        let value = self
            .put(PATH, json!({ "sessionHandle": session_handle, "userDataInDatabase": data }))
            .await?;
        match status(&value) {
            "OK" => Ok(true),
            "UNAUTHORISED" => Ok(false),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn update_access_token_payload(&self, session_handle: &str, payload: Value) -> Result<bool> {
        const PATH: &str = "/recipe/jwt/data";
        let value = self
            .put(PATH, json!({ "sessionHandle": session_handle, "userDataInJWT": payload }))
            .await?;
        match status(&value) {
            "OK" => Ok(true),
            "UNAUTHORISED" => Ok(false),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn signing_key(&self) -> Result<SigningKey> {
        const PATH: &str = "/recipe/handshake";
        let value = self.get(PATH, &[]).await?;
        field(PATH, &value, "signingKey")
    }
}

#[async_trait]
impl EmailPasswordCore for HttpCore {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        const PATH: &str = "/recipe/signup";
        let value = self.post(PATH, json!({ "email": email, "password": password })).await?;
        match status(&value) {
            "OK" => Ok(SignUpResult::Ok(field(PATH, &value, "user")?)),
            "EMAIL_ALREADY_EXISTS_ERROR" => Ok(SignUpResult::EmailAlreadyExists),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult> {
        const PATH: &str = "/recipe/signin";
        let value = self.post(PATH, json!({ "email": email, "password": password })).await?;
        match status(&value) {
            "OK" => Ok(SignInResult::Ok(field(PATH, &value, "user")?)),
            "WRONG_CREDENTIALS_ERROR" => Ok(SignInResult::WrongCredentials),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        const PATH: &str = "/recipe/user";
        let value = self.get(PATH, &[("userId", user_id)]).await?;
        match status(&value) {
            "OK" => field(PATH, &value, "user").map(Some),
            "UNKNOWN_USER_ID_ERROR" => Ok(None),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        const PATH: &str = "/recipe/user";
        let value = self.get(PATH, &[("email", email)]).await?;
        match status(&value) {
            "OK" => field(PATH, &value, "user").map(Some),
            "UNKNOWN_EMAIL_ERROR" => Ok(None),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult> {
        const PATH: &str = "/recipe/user/password/reset/token";
        let value = self.post(PATH, json!({ "userId": user_id })).await?;
        match status(&value) {
            "OK" => Ok(CreateResetTokenResult::Ok(field(PATH, &value, "token")?)),
            "UNKNOWN_USER_ID_ERROR" => Ok(CreateResetTokenResult::UnknownUserId),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult> {
        const PATH: &str = "/recipe/user/password/reset";
        let body = json!({ "method": "token", "token": token, "newPassword": new_password });
        let value = self.post(PATH, body).await?;
        match status(&value) {
            "OK" => Ok(ResetPasswordResult::Ok(
                value.get("userId").and_then(Value::as_str).map(str::to_string),
            )),
            "RESET_PASSWORD_INVALID_TOKEN_ERROR" => Ok(ResetPasswordResult::InvalidToken),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }
}

#[async_trait]
impl ThirdPartyCore for HttpCore {
    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult> {
        const PATH: &str = "/recipe/signinup";
        let body = json!({
            "thirdPartyId": third_party_id,
            "thirdPartyUserId": third_party_user_id,
            "email": email,
        });
        let value = self.post(PATH, body).await?;
        match status(&value) {
            "OK" => Ok(SignInUpResult {
                created_new_user: field(PATH, &value, "createdNewUser")?,
                user: field(PATH, &value, "user")?,
            }),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn get_third_party_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        const PATH: &str = "/recipe/user";
        let value = self.get(PATH, &[("userId", user_id)]).await?;
        match status(&value) {
            "OK" => field(PATH, &value, "user").map(Some),
            "UNKNOWN_USER_ID_ERROR" => Ok(None),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>> {
        const PATH: &str = "/recipe/user";
        let value = self
            .get(
                PATH,
                &[("thirdPartyId", third_party_id), ("thirdPartyUserId", third_party_user_id)],
            )
            .await?;
        match status(&value) {
            "OK" => field(PATH, &value, "user").map(Some),
            "UNKNOWN_THIRD_PARTY_USER_ERROR" => Ok(None),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }
}

#[async_trait]
impl EmailVerificationCore for HttpCore {
    async fn create_email_verification_token(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<CreateEmailVerificationTokenResult> {
        const PATH: &str = "/recipe/user/email/verify/token";
        let value = self.post(PATH, json!({ "userId": user_id, "email": email })).await?;
        match status(&value) {
            "OK" => Ok(CreateEmailVerificationTokenResult::Ok(field(PATH, &value, "token")?)),
            "EMAIL_ALREADY_VERIFIED_ERROR" => Ok(CreateEmailVerificationTokenResult::EmailAlreadyVerified),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn verify_email_using_token(&self, token: &str) -> Result<VerifyEmailResult> {
        const PATH: &str = "/recipe/user/email/verify";
        let value = self.post(PATH, json!({ "method": "token", "token": token })).await?;
        match status(&value) {
            "OK" => Ok(VerifyEmailResult::Ok {
                user_id: field(PATH, &value, "userId")?,
                email: field(PATH, &value, "email")?,
            }),
            "EMAIL_VERIFICATION_INVALID_TOKEN_ERROR" => Ok(VerifyEmailResult::InvalidToken),
            _ => Err(unexpected_status(PATH, &value)),
        }
    }

    async fn is_email_verified(&self, user_id: &str, email: &str) -> Result<bool> {
        const PATH: &str = "/recipe/user/email/verify";
        let value = self.get(PATH, &[("userId", user_id), ("email", email)]).await?;
        field(PATH, &value, "isVerified")
    }
}

#[async_trait]
impl OpenIdCore for HttpCore {
    async fn discovery_document(&self) -> Result<Value> {
        self.get("/.well-known/openid-configuration", &[]).await
    }

    async fn jwks(&self) -> Result<Value> {
        self.get("/recipe/jwt/jwks", &[]).await
    }
}
