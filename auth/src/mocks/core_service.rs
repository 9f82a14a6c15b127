//! In-memory core service.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use keyward_core::{Clock, Error, Result, SessionError, SystemClock};
use rand::RngCore;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::providers::{
    CreateEmailVerificationTokenResult, CreateResetTokenResult, CreatedSession, EmailPasswordCore,
    EmailVerificationCore, OpenIdCore, ProviderEmail, ResetPasswordResult, SessionCore,
    SessionHandleInfo, SessionInformation, SignInResult, SignInUpResult, SignUpResult, SigningKey,
    ThirdPartyCore, ThirdPartyInfo, TokenInfo, User, VerifiedAccess, VerifyEmailResult,
};
use crate::session::access_token::{self, AccessTokenPayload};
use crate::utils::to_millis;

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn hash(value: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(value.as_bytes()))
}

struct SessionRecord {
    user_id: String,
    access_token_payload: Value,
    session_data: Value,
    refresh_hash: String,
    /// Hash of the token the current one replaced. Replaying it is theft.
    parent_hash: Option<String>,
    anti_csrf: Option<String>,
    expiry: i64,
    time_created: i64,
}

struct UserRecord {
    user: User,
    password_digest: Option<String>,
}

struct EmailToken {
    user_id: String,
    email: String,
    expiry: i64,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionRecord>,
    // refresh token hash -> session handle, for every hash ever issued to a
    // live session
    refresh_index: HashMap<String, String>,
    users: HashMap<String, UserRecord>,
    reset_tokens: HashMap<String, EmailToken>,
    verification_tokens: HashMap<String, EmailToken>,
    verified: HashSet<(String, String)>,
}

/// In-memory stand-in for the core service.
///
/// Access tokens are real HS256 JWTs, refresh tokens are random and stored
/// hashed, and refresh rotation happens under one lock so concurrent
/// refreshes of the same token yield exactly one winner.
#[derive(Clone)]
pub struct MockCore {
    state: Arc<Mutex<State>>,
    signing_key: Arc<Mutex<SigningKey>>,
    clock: Arc<dyn Clock>,
    access_token_validity: Duration,
    refresh_token_validity: Duration,
    issuer: String,
}

impl MockCore {
    /// Empty core with a fresh signing key and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            signing_key: Arc::new(Mutex::new(Self::fresh_key())),
            clock: Arc::new(SystemClock),
            access_token_validity: Duration::hours(1),
            refresh_token_validity: Duration::days(100),
            issuer: "https://api.example.com/auth".to_string(),
        }
    }

    /// Use a specific clock for issue and expiry times.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the access token lifetime.
    #[must_use]
    pub const fn with_access_token_validity(mut self, validity: Duration) -> Self {
        self.access_token_validity = validity;
        self
    }

    /// Set the issuer published in the discovery document.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    fn fresh_key() -> SigningKey {
        SigningKey {
            algorithm: "HS256".into(),
            key: random_token(32),
        }
    }

    /// Replace the signing key. Tokens signed with the old key stop verifying.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn rotate_signing_key(&self) -> Result<()> {
        *self
            .signing_key
            .lock()
            .map_err(|_| Error::Internal("Mutex lock failed".to_string()))? = Self::fresh_key();
        Ok(())
    }

    /// Number of live sessions.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn session_count(&self) -> Result<usize> {
        Ok(self.lock()?.sessions.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("Mutex lock failed".to_string()))
    }

    fn key(&self) -> Result<SigningKey> {
        self.signing_key
            .lock()
            .map(|k| k.clone())
            .map_err(|_| Error::Internal("Mutex lock failed".to_string()))
    }

    fn now(&self) -> i64 {
        to_millis(self.clock.now())
    }

    /// Mint tokens for `handle`, updating the record's refresh hash.
    ///
    /// The index keeps the current and parent hash of each session; older
    /// ancestors are dropped.
    fn issue(
        &self,
        handle: &str,
        record: &mut SessionRecord,
        parent_hash: Option<String>,
        enable_anti_csrf: bool,
        refresh_index: &mut HashMap<String, String>,
    ) -> Result<CreatedSession> {
        let now = self.now();
        let refresh_token = random_token(48);
        let refresh_hash = hash(&refresh_token);
        let anti_csrf = enable_anti_csrf.then(|| random_token(16));

        let access_expiry = now + self.access_token_validity.num_milliseconds();
        let refresh_expiry = now + self.refresh_token_validity.num_milliseconds();
        let payload = AccessTokenPayload {
            session_handle: handle.to_string(),
            user_id: record.user_id.clone(),
            refresh_token_hash1: refresh_hash.clone(),
            parent_refresh_token_hash1: parent_hash.clone(),
            user_data: record.access_token_payload.clone(),
            anti_csrf_token: anti_csrf.clone(),
            expiry_time: access_expiry,
            time_created: now,
        };
        let access_token = access_token::sign(&payload, &self.key()?)
            .map_err(|e| Error::Internal(e.to_string()))?;

        if parent_hash.is_some() {
            if let Some(grandparent) = std::mem::replace(&mut record.parent_hash, parent_hash) {
                refresh_index.remove(&grandparent);
            }
        }
        refresh_index.insert(refresh_hash.clone(), handle.to_string());
        record.refresh_hash = refresh_hash;
        record.anti_csrf.clone_from(&anti_csrf);
        record.expiry = refresh_expiry;

        Ok(CreatedSession {
            session: SessionHandleInfo {
                handle: handle.to_string(),
                user_id: record.user_id.clone(),
                user_data_in_jwt: record.access_token_payload.clone(),
            },
            access_token: TokenInfo {
                token: access_token,
                expiry: access_expiry,
                created_time: now,
            },
            refresh_token: TokenInfo {
                token: refresh_token,
                expiry: refresh_expiry,
                created_time: now,
            },
            id_refresh_token: TokenInfo {
                token: uuid::Uuid::new_v4().to_string(),
                expiry: refresh_expiry,
                created_time: now,
            },
            anti_csrf_token: anti_csrf,
        })
    }

    fn remove_session(state: &mut State, handle: &str) -> bool {
        let removed = state.sessions.remove(handle).is_some();
        if removed {
            state.refresh_index.retain(|_, h| h != handle);
        }
        removed
    }

    fn create_user(state: &mut State, email: &str, password_digest: Option<String>, third_party: Option<ThirdPartyInfo>, now: i64) -> User {
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            time_joined: now,
            third_party,
        };
        state.users.insert(
            user.id.clone(),
            UserRecord {
                user: user.clone(),
                password_digest,
            },
        );
        user
    }
}

impl Default for MockCore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCore")
            .field("access_token_validity", &self.access_token_validity)
            .field("refresh_token_validity", &self.refresh_token_validity)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

fn password_digest(email: &str, password: &str) -> String {
    hash(&format!("{email}:{password}"))
}

#[async_trait]
impl SessionCore for MockCore {
    async fn create_session(
        &self,
        user_id: &str,
        access_token_payload: Value,
        session_data: Value,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession> {
        let handle = uuid::Uuid::new_v4().to_string();
        let mut record = SessionRecord {
            user_id: user_id.to_string(),
            access_token_payload,
            session_data,
            refresh_hash: String::new(),
            parent_hash: None,
            anti_csrf: None,
            expiry: 0,
            time_created: self.now(),
        };

        let mut state = self.lock()?;
        let created = self.issue(&handle, &mut record, None, enable_anti_csrf, &mut state.refresh_index)?;
        state.sessions.insert(handle, record);
        Ok(created)
    }

    async fn verify_session(
        &self,
        access_token: &str,
        anti_csrf_token: Option<&str>,
        do_anti_csrf_check: bool,
    ) -> Result<VerifiedAccess> {
        let key = self.key()?;
        let payload = access_token::verify(access_token, &key)
            .map_err(|e| SessionError::try_refresh(e.to_string()))?;
        if payload.expiry_time < self.now() {
            return Err(SessionError::try_refresh("Access token expired").into());
        }
        if do_anti_csrf_check && payload.anti_csrf_token.as_deref() != anti_csrf_token {
            return Err(SessionError::try_refresh("anti-csrf check failed").into());
        }

        let state = self.lock()?;
        let record = state
            .sessions
            .get(&payload.session_handle)
            .ok_or_else(|| SessionError::unauthorised("Session does not exist", true))?;
        let session = SessionHandleInfo {
            handle: payload.session_handle.clone(),
            user_id: record.user_id.clone(),
            user_data_in_jwt: record.access_token_payload.clone(),
        };
        drop(state);

        if payload.parent_refresh_token_hash1.is_none() {
            return Ok(VerifiedAccess {
                session,
                access_token: None,
            });
        }

        let now = self.now();
        let confirmed = AccessTokenPayload {
            parent_refresh_token_hash1: None,
            time_created: now,
            ..payload
        };
        let token = access_token::sign(&confirmed, &key).map_err(|e| Error::Internal(e.to_string()))?;
        Ok(VerifiedAccess {
            session,
            access_token: Some(TokenInfo {
                token,
                expiry: confirmed.expiry_time,
                created_time: now,
            }),
        })
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
        anti_csrf_token: Option<&str>,
        enable_anti_csrf: bool,
    ) -> Result<CreatedSession> {
        let presented = hash(refresh_token);
        let now = self.now();

        let mut state = self.lock()?;
        let State {
            sessions,
            refresh_index,
            ..
        } = &mut *state;

        let Some(handle) = refresh_index.get(&presented).cloned() else {
            return Err(SessionError::unauthorised("Refresh token not recognised", true).into());
        };
        let Some(record) = sessions.get_mut(&handle) else {
            return Err(SessionError::unauthorised("Session does not exist", true).into());
        };

        if record.refresh_hash != presented {
            return Err(SessionError::TokenTheftDetected {
                session_handle: handle,
                user_id: record.user_id.clone(),
            }
            .into());
        }
        if record.expiry < now {
            return Err(SessionError::unauthorised("Refresh token expired", true).into());
        }
        if enable_anti_csrf && record.anti_csrf.as_deref() != anti_csrf_token {
            return Err(SessionError::unauthorised("anti-csrf check failed", false).into());
        }

        self.issue(&handle, record, Some(presented), enable_anti_csrf, refresh_index)
    }

    async fn revoke_sessions(&self, session_handles: &[String]) -> Result<Vec<String>> {
        let mut state = self.lock()?;
        Ok(session_handles
            .iter()
            .filter(|handle| Self::remove_session(&mut state, handle))
            .cloned()
            .collect())
    }

    async fn revoke_all_sessions_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        let mut state = self.lock()?;
        let handles: Vec<String> = state
            .sessions
            .iter()
            .filter(|(_, record)| record.user_id == user_id)
            .map(|(handle, _)| handle.clone())
            .collect();
        for handle in &handles {
            Self::remove_session(&mut state, handle);
        }
        Ok(handles)
    }

    async fn get_session_information(&self, session_handle: &str) -> Result<Option<SessionInformation>> {
        let state = self.lock()?;
        Ok(state.sessions.get(session_handle).map(|record| SessionInformation {
            session_handle: session_handle.to_string(),
            user_id: record.user_id.clone(),
            session_data: record.session_data.clone(),
            expiry: record.expiry,
            access_token_payload: record.access_token_payload.clone(),
            time_created: record.time_created,
        }))
    }

    async fn update_session_data(&self, session_handle: &str, data: Value) -> Result<bool> {
        let mut state = self.lock()?;
        Ok(state
            .sessions
            .get_mut(session_handle)
            .map(|record| record.session_data = data)
            .is_some())
    }

    async fn update_access_token_payload(&self, session_handle: &str, payload: Value) -> Result<bool> {
        let mut state = self.lock()?;
        Ok(state
            .sessions
            .get_mut(session_handle)
            .map(|record| record.access_token_payload = payload)
            .is_some())
    }

    async fn signing_key(&self) -> Result<SigningKey> {
        self.key()
    }
}

#[async_trait]
impl EmailPasswordCore for MockCore {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult> {
        let now = self.now();
        let mut state = self.lock()?;
        let taken = state
            .users
            .values()
            .any(|r| r.user.third_party.is_none() && r.user.email == email);
        if taken {
            return Ok(SignUpResult::EmailAlreadyExists);
        }
        let user = Self::create_user(&mut state, email, Some(password_digest(email, password)), None, now);
        Ok(SignUpResult::Ok(user))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SignInResult> {
        let state = self.lock()?;
        let digest = password_digest(email, password);
        Ok(state
            .users
            .values()
            .find(|r| r.user.third_party.is_none() && r.user.email == email)
            .filter(|r| r.password_digest.as_deref() == Some(digest.as_str()))
            .map_or(SignInResult::WrongCredentials, |r| SignInResult::Ok(r.user.clone())))
    }

    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .get(user_id)
            .filter(|r| r.user.third_party.is_none())
            .map(|r| r.user.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .values()
            .find(|r| r.user.third_party.is_none() && r.user.email == email)
            .map(|r| r.user.clone()))
    }

    async fn create_reset_password_token(&self, user_id: &str) -> Result<CreateResetTokenResult> {
        let expiry = self.now() + Duration::hours(1).num_milliseconds();
        let mut state = self.lock()?;
        let Some(email) = state
            .users
            .get(user_id)
            .filter(|r| r.user.third_party.is_none())
            .map(|r| r.user.email.clone())
        else {
            return Ok(CreateResetTokenResult::UnknownUserId);
        };
        let token = random_token(32);
        state.reset_tokens.insert(
            token.clone(),
            EmailToken {
                user_id: user_id.to_string(),
                email,
                expiry,
            },
        );
        Ok(CreateResetTokenResult::Ok(token))
    }

    async fn reset_password_using_token(&self, token: &str, new_password: &str) -> Result<ResetPasswordResult> {
        let now = self.now();
        let mut state = self.lock()?;
        let Some(entry) = state.reset_tokens.remove(token).filter(|t| t.expiry >= now) else {
            return Ok(ResetPasswordResult::InvalidToken);
        };
        // Every outstanding token of the user dies with the reset.
        state.reset_tokens.retain(|_, t| t.user_id != entry.user_id);
        match state.users.get_mut(&entry.user_id) {
            Some(record) => {
                record.password_digest = Some(password_digest(&entry.email, new_password));
                Ok(ResetPasswordResult::Ok(Some(entry.user_id)))
            }
            None => Ok(ResetPasswordResult::InvalidToken),
        }
    }
}

#[async_trait]
impl ThirdPartyCore for MockCore {
    async fn sign_in_up(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
        email: &ProviderEmail,
    ) -> Result<SignInUpResult> {
        let now = self.now();
        let info = ThirdPartyInfo {
            id: third_party_id.to_string(),
            user_id: third_party_user_id.to_string(),
        };
        let mut state = self.lock()?;
        if let Some(record) = state
            .users
            .values_mut()
            .find(|r| r.user.third_party.as_ref() == Some(&info))
        {
            record.user.email.clone_from(&email.id);
            return Ok(SignInUpResult {
                created_new_user: false,
                user: record.user.clone(),
            });
        }
        let user = Self::create_user(&mut state, &email.id, None, Some(info), now);
        Ok(SignInUpResult {
            created_new_user: true,
            user,
        })
    }

    async fn get_third_party_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .get(user_id)
            .filter(|r| r.user.third_party.is_some())
            .map(|r| r.user.clone()))
    }

    async fn get_user_by_third_party_info(
        &self,
        third_party_id: &str,
        third_party_user_id: &str,
    ) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .values()
            .find(|r| {
                r.user
                    .third_party
                    .as_ref()
                    .is_some_and(|tp| tp.id == third_party_id && tp.user_id == third_party_user_id)
            })
            .map(|r| r.user.clone()))
    }
}

#[async_trait]
impl EmailVerificationCore for MockCore {
    async fn create_email_verification_token(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<CreateEmailVerificationTokenResult> {
        let expiry = self.now() + Duration::days(1).num_milliseconds();
        let mut state = self.lock()?;
        if state.verified.contains(&(user_id.to_string(), email.to_string())) {
            return Ok(CreateEmailVerificationTokenResult::EmailAlreadyVerified);
        }
        let token = random_token(32);
        state.verification_tokens.insert(
            token.clone(),
            EmailToken {
                user_id: user_id.to_string(),
                email: email.to_string(),
                expiry,
            },
        );
        Ok(CreateEmailVerificationTokenResult::Ok(token))
    }

    async fn verify_email_using_token(&self, token: &str) -> Result<VerifyEmailResult> {
        let now = self.now();
        let mut state = self.lock()?;
        let Some(entry) = state.verification_tokens.remove(token).filter(|t| t.expiry >= now) else {
            return Ok(VerifyEmailResult::InvalidToken);
        };
        state
            .verification_tokens
            .retain(|_, t| !(t.user_id == entry.user_id && t.email == entry.email));
        state.verified.insert((entry.user_id.clone(), entry.email.clone()));
        Ok(VerifyEmailResult::Ok {
            user_id: entry.user_id,
            email: entry.email,
        })
    }

    async fn is_email_verified(&self, user_id: &str, email: &str) -> Result<bool> {
        let state = self.lock()?;
        Ok(state.verified.contains(&(user_id.to_string(), email.to_string())))
    }
}

#[async_trait]
impl OpenIdCore for MockCore {
    async fn discovery_document(&self) -> Result<Value> {
        Ok(json!({
            "issuer": self.issuer,
            "jwks_uri": format!("{}/jwt/jwks.json", self.issuer),
        }))
    }

    async fn jwks(&self) -> Result<Value> {
        let key = self.key()?;
        Ok(json!({
            "keys": [{
                "kty": "oct",
                "alg": key.algorithm,
                "use": "sig",
                "kid": hash(&key.key),
            }]
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refresh_rotates_and_detects_replay() {
        let core = MockCore::new();
        let created = core.create_session("u1", json!({}), json!({}), false).await.unwrap();

        let rotated = core
            .refresh_session(&created.refresh_token.token, None, false)
            .await
            .unwrap();
        assert_ne!(rotated.refresh_token.token, created.refresh_token.token);
        assert_eq!(rotated.session.handle, created.session.handle);

        match core.refresh_session(&created.refresh_token.token, None, false).await {
            Err(Error::Session(SessionError::TokenTheftDetected { session_handle, user_id })) => {
                assert_eq!(session_handle, created.session.handle);
                assert_eq!(user_id, "u1");
            }
            other => panic!("expected theft, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_index_keeps_only_current_and_parent() {
        let core = MockCore::new();
        let created = core.create_session("u1", json!({}), json!({}), false).await.unwrap();

        let mut chain = vec![created];
        for _ in 0..10 {
            let latest = &chain[chain.len() - 1].refresh_token.token;
            let next = core.refresh_session(latest, None, false).await.unwrap();
            chain.push(next);
        }
        assert_eq!(core.lock().unwrap().refresh_index.len(), 2);

        let current = &chain[chain.len() - 1];
        let previous = &chain[chain.len() - 2].refresh_token.token;

        match core.refresh_session(previous, None, false).await {
            Err(Error::Session(SessionError::TokenTheftDetected { session_handle, .. })) => {
                assert_eq!(session_handle, current.session.handle);
            }
            other => panic!("expected theft, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn verify_replaces_a_rotated_access_token_once() {
        let core = MockCore::new();
        let created = core.create_session("u1", json!({ "role": "admin" }), json!({}), false).await.unwrap();

        let fresh = core.verify_session(&created.access_token.token, None, false).await.unwrap();
        assert_eq!(fresh.access_token, None);

        let rotated = core
            .refresh_session(&created.refresh_token.token, None, false)
            .await
            .unwrap();
        let confirmed = core
            .verify_session(&rotated.access_token.token, None, false)
            .await
            .unwrap()
            .access_token
            .expect("replacement token");
        assert_eq!(confirmed.expiry, rotated.access_token.expiry);

        let payload = access_token::verify(&confirmed.token, &core.key().unwrap()).unwrap();
        assert_eq!(payload.parent_refresh_token_hash1, None);
        assert_eq!(payload.refresh_token_hash1, hash(&rotated.refresh_token.token));
        assert_eq!(payload.user_data, json!({ "role": "admin" }));

        let again = core.verify_session(&confirmed.token, None, false).await.unwrap();
        assert_eq!(again.access_token, None);
    }

    #[tokio::test]
    async fn revoked_sessions_cannot_refresh() {
        let core = MockCore::new();
        let created = core.create_session("u1", json!({}), json!({}), false).await.unwrap();
        let revoked = core.revoke_all_sessions_for_user("u1").await.unwrap();
        assert_eq!(revoked, vec![created.session.handle.clone()]);

        let err = core
            .refresh_session(&created.refresh_token.token, None, false)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::unauthorised("Refresh token not recognised", true).into());
        assert_eq!(core.session_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn anti_csrf_mismatch_on_refresh_keeps_cookies() {
        let core = MockCore::new();
        let created = core.create_session("u1", json!({}), json!({}), true).await.unwrap();
        assert!(created.anti_csrf_token.is_some());

        let err = core
            .refresh_session(&created.refresh_token.token, Some("wrong"), true)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::unauthorised("anti-csrf check failed", false).into());
    }

    #[tokio::test]
    async fn password_users_and_third_party_users_are_separate() {
        let core = MockCore::new();
        let SignUpResult::Ok(user) = core.sign_up("a@b.com", "pass1234").await.unwrap() else {
            panic!("sign up failed");
        };
        assert_eq!(core.sign_up("a@b.com", "x").await.unwrap(), SignUpResult::EmailAlreadyExists);
        assert_eq!(core.sign_in("a@b.com", "pass1234").await.unwrap(), SignInResult::Ok(user.clone()));
        assert_eq!(core.sign_in("a@b.com", "nope").await.unwrap(), SignInResult::WrongCredentials);

        let email = ProviderEmail {
            id: "a@b.com".into(),
            is_verified: true,
        };
        let first = core.sign_in_up("google", "g1", &email).await.unwrap();
        let second = core.sign_in_up("google", "g1", &email).await.unwrap();
        assert!(first.created_new_user && !second.created_new_user);
        assert_ne!(first.user.id, user.id);
        assert_eq!(core.get_user_by_id(&first.user.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reset_tokens_are_single_use() {
        let core = MockCore::new();
        let SignUpResult::Ok(user) = core.sign_up("a@b.com", "pass1234").await.unwrap() else {
            panic!("sign up failed");
        };
        let CreateResetTokenResult::Ok(token) = core.create_reset_password_token(&user.id).await.unwrap() else {
            panic!("no token");
        };
        assert_eq!(
            core.reset_password_using_token(&token, "newpass99").await.unwrap(),
            ResetPasswordResult::Ok(Some(user.id.clone()))
        );
        assert_eq!(
            core.reset_password_using_token(&token, "again123").await.unwrap(),
            ResetPasswordResult::InvalidToken
        );
        assert!(matches!(core.sign_in("a@b.com", "newpass99").await.unwrap(), SignInResult::Ok(_)));
    }
}
