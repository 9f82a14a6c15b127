//! Access token claims and signature verification.
//!
//! Access tokens are JWTs minted by the core service. This side only checks
//! the signature with the key from `GET /recipe/handshake` and reads the
//! claims; expiry is checked by the caller against its own clock.

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::SigningKey;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenPayload {
    /// Session family handle.
    pub session_handle: String,

    /// Owner.
    pub user_id: String,

    /// Hash of the refresh token this access token was issued with.
    pub refresh_token_hash1: String,

    /// Hash of the previous refresh token, until the new one is first used.
    #[serde(default)]
    pub parent_refresh_token_hash1: Option<String>,

    /// Application payload.
    #[serde(default)]
    pub user_data: Value,

    /// Anti-CSRF token, in `VIA_TOKEN` mode.
    #[serde(default)]
    pub anti_csrf_token: Option<String>,

    /// Expiry, milliseconds since the epoch.
    pub expiry_time: i64,

    /// Issue time, milliseconds since the epoch.
    pub time_created: i64,
}

/// Why a token was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    /// The key's algorithm is not supported or the key does not parse.
    BadKey(String),

    /// Signature or structure is invalid.
    Invalid(String),
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadKey(msg) => write!(f, "unusable signing key: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid access token: {msg}"),
        }
    }
}

fn algorithm(key: &SigningKey) -> Result<Algorithm, TokenRejection> {
    match key.algorithm.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "RS256" => Ok(Algorithm::RS256),
        other => Err(TokenRejection::BadKey(format!("unsupported algorithm `{other}`"))),
    }
}

/// Verify the signature of `token` and return its claims.
///
/// # Errors
///
/// Returns [`TokenRejection`] when the key is unusable or the token does not
/// verify.
pub fn verify(token: &str, key: &SigningKey) -> Result<AccessTokenPayload, TokenRejection> {
    let alg = algorithm(key)?;
    let decoding_key = match alg {
        Algorithm::RS256 => DecodingKey::from_rsa_pem(key.key.as_bytes())
            .map_err(|e| TokenRejection::BadKey(e.to_string()))?,
        _ => DecodingKey::from_secret(key.key.as_bytes()),
    };

    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    jsonwebtoken::decode::<AccessTokenPayload>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenRejection::Invalid(e.to_string()))
}

/// Sign claims with an HS256 key. Used by in-process cores.
///
/// # Errors
///
/// Returns [`TokenRejection::BadKey`] for non-HS256 keys.
pub fn sign(payload: &AccessTokenPayload, key: &SigningKey) -> Result<String, TokenRejection> {
    if algorithm(key)? != Algorithm::HS256 {
        return Err(TokenRejection::BadKey("only HS256 keys can sign".into()));
    }
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        payload,
        &EncodingKey::from_secret(key.key.as_bytes()),
    )
    .map_err(|e| TokenRejection::BadKey(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(secret: &str) -> SigningKey {
        SigningKey {
            algorithm: "HS256".into(),
            key: secret.into(),
        }
    }

    fn payload() -> AccessTokenPayload {
        AccessTokenPayload {
            session_handle: "h1".into(),
            user_id: "u1".into(),
            refresh_token_hash1: "r1".into(),
            parent_refresh_token_hash1: None,
            user_data: json!({"role": "admin"}),
            anti_csrf_token: Some("csrf".into()),
            expiry_time: 1,
            time_created: 0,
        }
    }

    #[test]
    fn verifies_its_own_signature_even_when_expired() {
        let token = sign(&payload(), &key("secret")).unwrap();
        let claims = verify(&token, &key("secret")).unwrap();
        assert_eq!(claims, payload());
    }

    #[test]
    fn rejects_other_keys_and_garbage() {
        let token = sign(&payload(), &key("secret")).unwrap();
        assert!(matches!(verify(&token, &key("other")), Err(TokenRejection::Invalid(_))));
        assert!(matches!(verify("not-a-jwt", &key("secret")), Err(TokenRejection::Invalid(_))));
    }

    #[test]
    fn unknown_algorithms_are_rejected() {
        let bad = SigningKey {
            algorithm: "none".into(),
            key: String::new(),
        };
        assert!(matches!(verify("x", &bad), Err(TokenRejection::BadKey(_))));
    }

    #[test]
    fn claims_use_camel_case() {
        let value = serde_json::to_value(payload()).unwrap();
        assert_eq!(value["sessionHandle"], "h1");
        assert_eq!(value["refreshTokenHash1"], "r1");
        assert_eq!(value["antiCsrfToken"], "csrf");
    }
}
