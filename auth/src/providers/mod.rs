//! Authentication providers.
//!
//! This module defines traits for all external dependencies used by the
//! capability modules: the core service that owns users and session
//! families, third-party OAuth providers, and email delivery. These traits
//! enable dependency injection and make the modules testable.
//!
//! # Architecture
//!
//! Providers are **interfaces**, not implementations. The modules depend on
//! these traits; the application supplies [`HttpCore`](http_core::HttpCore)
//! in production and the in-memory mocks in tests.
//!
//! ```text
//! Module (emailpassword, session, ...)
//!    │ behavior trait (overridable)
//!    ▼
//! *Core trait  ──► HttpCore ──► core service (JSON over HTTP)
//!              └─► MockCore (in-memory, tests)
//! ```

use async_trait::async_trait;
use keyward_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod console_email;
pub mod email;
pub mod http_core;
pub mod oauth;

pub use console_email::ConsoleEmailDelivery;
pub use email::{AuthEmail, EmailDelivery, EmailKind};
pub use http_core::HttpCore;
pub use oauth::{AuthParam, OAuth2Provider, ThirdPartyProvider, UserInfo, UserInfoEmail};

// ═══════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════

/// Third-party identity attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThirdPartyInfo {
    /// Provider id (`"google"`, `"github"`, ...).
    pub id: String,

    /// User id at the provider.
    pub user_id: String,
}

/// User data model, owned by the core service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User ID.
    pub id: String,

    /// Email address.
    pub email: String,

    /// Sign-up time, milliseconds since the epoch.
    pub time_joined: i64,

    /// Set for users created through a third-party provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub third_party: Option<ThirdPartyInfo>,
}

// ═══════════════════════════════════════════════════════════
// Sessions
// ═══════════════════════════════════════════════════════════

/// A token minted by the core service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    /// Opaque token value.
    pub token: String,

    /// Expiry, milliseconds since the epoch.
    pub expiry: i64,

    /// Creation time, milliseconds since the epoch.
    pub created_time: i64,
}

/// Identity of a session family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandleInfo {
    /// Session handle, stable across refreshes.
    pub handle: String,

    /// Owner.
    pub user_id: String,

    /// Payload embedded in access tokens.
    #[serde(rename = "userDataInJWT", default)]
    pub user_data_in_jwt: Value,
}

/// Result of creating or refreshing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    /// Session identity.
    pub session: SessionHandleInfo,

    /// New access token.
    pub access_token: TokenInfo,

    /// New refresh token.
    pub refresh_token: TokenInfo,

    /// New id-refresh token.
    pub id_refresh_token: TokenInfo,

    /// Anti-CSRF token, when the mode is `VIA_TOKEN`.
    #[serde(default)]
    pub anti_csrf_token: Option<String>,
}

/// Result of a server-side access token check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAccess {
    /// The session the token belongs to.
    pub session: SessionHandleInfo,

    /// Replacement access token, issued when the presented one still names
    /// a parent refresh token.
    #[serde(default)]
    pub access_token: Option<TokenInfo>,
}

/// Server-side view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInformation {
    /// Session handle.
    pub session_handle: String,

    /// Owner.
    pub user_id: String,

    /// Data stored only in the core service.
    #[serde(rename = "userDataInDatabase", default)]
    pub session_data: Value,

    /// Refresh token expiry, milliseconds since the epoch.
    pub expiry: i64,

    /// Payload embedded in access tokens.
    #[serde(rename = "userDataInJWT", default)]
    pub access_token_payload: Value,

    /// Creation time, milliseconds since the epoch.
    pub time_created: i64,
}

/// Key used to verify access token signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// `"HS256"` (shared secret) or `"RS256"` (PEM public key).
    pub algorithm: String,

    /// Secret or PEM text.
    pub key: String,
}

/// Session operations of the core service.
///
/// Refresh must be atomic per token family: of two concurrent refreshes with
/// the same token, exactly one succeeds.
#[async_trait]
pub trait SessionCore: Send + Sync {
    /// `POST /recipe/session`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn create_session(
        &self,
        user_id: &str,
        access_token_payload: Value,
        session_data: Value,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession>;

    /// `POST /recipe/session/verify`: server-side check of an access token.
    ///
    /// The first check of a token minted by a refresh retires the parent
    /// refresh token and returns a replacement access token without the
    /// parent hash.
    ///
    /// # Errors
    ///
    /// Session errors for unknown, revoked or expired sessions.
    async fn verify_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
    ) -> Result<VerifiedAccess>;

    /// `POST /recipe/session/refresh`
    ///
    /// # Errors
    ///
    /// `TokenTheftDetected` when a rotated token is replayed, `Unauthorised`
    /// for anything else that is not a current refresh token.
    async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession>;

    /// `POST /recipe/session/remove` by handle. Returns the handles revoked.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn revoke_sessions(&self, session_handles: &[String]) -> Result<Vec<String>>;

    /// `POST /recipe/session/remove` by user. Returns the handles revoked.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<Vec<String>>;

    /// `GET /recipe/session`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_session_information(&self, session_handle: &str) -> Result<Option<SessionInformation>>;

    /// `PUT /recipe/session/data`. `false` for unknown handles.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn update_session_data(&self, session_handle: &str, data: Value) -> Result<bool>;

    /// `PUT /recipe/jwt/data`. `false` for unknown handles.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn update_access_token_payload(&self, session_handle: &str, payload: Value) -> Result<bool>;

    /// `GET /recipe/handshake`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn signing_key(&self) -> Result<SigningKey>;
}

// ═══════════════════════════════════════════════════════════
// Email + password
// ═══════════════════════════════════════════════════════════

/// Outcome of sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpResult {
    /// New user.
    Ok(User),
    /// The email is taken.
    EmailAlreadyExists,
}

/// Outcome of sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInResult {
    /// Credentials accepted.
    Ok(User),
    /// Unknown email or wrong password.
    WrongCredentials,
}

/// Outcome of creating a password reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResetTokenResult {
    /// Token to embed in the reset link.
    Ok(String),
    /// No such user.
    UnknownUserId,
}

/// Outcome of a password reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetPasswordResult {
    /// Password changed; the user id if the core reports it.
    Ok(Option<String>),
    /// Token unknown, expired or already used.
    InvalidToken,
}

/// Email + password operations of the core service.
#[async_trait]
pub trait EmailPasswordCore: Send + Sync {
    /// `POST /recipe/signup`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult>;

    /// `POST /recipe/signin`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult>;

    /// `GET /recipe/user?userId=`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// `GET /recipe/user?email=`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// `POST /recipe/user/password/reset/token`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult>;

    /// `POST /recipe/user/password/reset`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult>;
}

// ═══════════════════════════════════════════════════════════
// Third party
// ═══════════════════════════════════════════════════════════

/// Email as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEmail {
    /// Address.
    pub id: String,

    /// Whether the provider vouches for it.
    pub is_verified: bool,
}

/// Outcome of third-party sign-in-or-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInUpResult {
    /// `true` if the user did not exist before.
    pub created_new_user: bool,

    /// The user.
    pub user: User,
}

/// Third-party user operations of the core service.
#[async_trait]
pub trait ThirdPartyCore: Send + Sync {
    /// `POST /recipe/signinup`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult>;

    /// `GET /recipe/user?userId=` for third-party users.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_third_party_user_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// `GET /recipe/user?thirdPartyId=&thirdPartyUserId=`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>>;
}

// ═══════════════════════════════════════════════════════════
// Email verification
// ═══════════════════════════════════════════════════════════

/// Outcome of creating a verification token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateEmailVerificationTokenResult {
    /// Token to embed in the verification link.
    Ok(String),
    /// Nothing to verify.
    EmailAlreadyVerified,
}

/// Outcome of consuming a verification token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyEmailResult {
    /// Email marked verified.
    Ok {
        /// User whose email was verified.
        user_id: String,
        /// The verified address.
        email: String,
    },
    /// Token unknown, expired or already used.
    InvalidToken,
}

/// Email verification operations of the core service.
#[async_trait]
pub trait EmailVerificationCore: Send + Sync {
    /// `POST /recipe/user/email/verify/token`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn create_email_verification_token(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<CreateEmailVerificationTokenResult>;

    /// `POST /recipe/user/email/verify`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn verify_email_using_token(&self, token: &str) -> Result<VerifyEmailResult>;

    /// `GET /recipe/user/email/verify`
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn is_email_verified(&self, user_id: &str, email: &str) -> Result<bool>;
}

// ═══════════════════════════════════════════════════════════
// OpenID / JWT
// ═══════════════════════════════════════════════════════════

/// Discovery and key-set documents served by the core service.
#[async_trait]
pub trait OpenIdCore: Send + Sync {
    /// `GET /.well-known/openid-configuration`, verbatim.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn discovery_document(&self) -> Result<Value>;

    /// `GET /recipe/jwt/jwks`, verbatim.
    ///
    /// # Errors
    ///
    /// Upstream failures.
    async fn jwks(&self) -> Result<Value>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_serialises_in_camel_case() {
        let user = User {
            id: "u1".into(),
            email: "a@b.com".into(),
            time_joined: 42,
            third_party: None,
        };
        assert_eq!(
            serde_json::to_value(&user).unwrap(),
            json!({"id": "u1", "email": "a@b.com", "timeJoined": 42})
        );
    }

    #[test]
    fn created_session_parses_core_payload() {
        let payload = json!({
            "status": "OK",
            "session": {"handle": "h", "userId": "u", "userDataInJWT": {"role": "admin"}},
            "accessToken": {"token": "a", "expiry": 2, "createdTime": 1},
            "refreshToken": {"token": "r", "expiry": 3, "createdTime": 1},
            "idRefreshToken": {"token": "i", "expiry": 3, "createdTime": 1},
            "antiCsrfToken": null
        });
        let created: CreatedSession = serde_json::from_value(payload).unwrap();
        assert_eq!(created.session.user_data_in_jwt["role"], "admin");
        assert_eq!(created.anti_csrf_token, None);
    }
}
