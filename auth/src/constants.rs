//! Authentication constants.
//!
//! Cookie and header names are part of the wire contract with frontend SDKs
//! and must not change.

/// Module identifiers (also the values frontends send in the `rid` header).
pub mod module_ids {
    /// Session management.
    pub const SESSION: &str = "session";
    /// Email + password.
    pub const EMAIL_PASSWORD: &str = "emailpassword";
    /// Third-party OAuth.
    pub const THIRD_PARTY: &str = "thirdparty";
    /// Email verification.
    pub const EMAIL_VERIFICATION: &str = "emailverification";
    /// Third-party + email/password composite.
    pub const THIRD_PARTY_EMAIL_PASSWORD: &str = "thirdpartyemailpassword";
    /// OpenID discovery.
    pub const OPENID: &str = "openid";
    /// JWT signing keys.
    pub const JWT: &str = "jwt";
}

/// Route identifiers, one per handled operation.
pub mod route_ids {
    /// `POST /session/refresh`
    pub const SESSION_REFRESH: &str = "session.refresh";
    /// `POST /signout`
    pub const SESSION_SIGNOUT: &str = "session.signout";
    /// `POST /signup`
    pub const SIGN_UP: &str = "emailpassword.signup";
    /// `POST /signin`
    pub const SIGN_IN: &str = "emailpassword.signin";
    /// `GET /signup/email/exists`
    pub const EMAIL_EXISTS: &str = "emailpassword.email_exists";
    /// `POST /user/password/reset/token`
    pub const RESET_PASSWORD_TOKEN: &str = "emailpassword.reset_token";
    /// `POST /user/password/reset`
    pub const RESET_PASSWORD: &str = "emailpassword.reset_password";
    /// `GET /authorisationurl`
    pub const AUTHORISATION_URL: &str = "thirdparty.authorisation_url";
    /// `POST /signinup`
    pub const SIGN_IN_UP: &str = "thirdparty.signinup";
    /// `POST /user/email/verify/token`
    pub const GENERATE_EMAIL_VERIFY_TOKEN: &str = "emailverification.generate_token";
    /// `POST /user/email/verify`
    pub const VERIFY_EMAIL: &str = "emailverification.verify";
    /// `GET /user/email/verify`
    pub const IS_EMAIL_VERIFIED: &str = "emailverification.is_verified";
    /// `GET /.well-known/openid-configuration`
    pub const OPENID_DISCOVERY: &str = "openid.discovery";
    /// `GET /jwt/jwks.json`
    pub const JWKS: &str = "jwt.jwks";
}

/// Session cookie names.
pub mod cookies {
    /// Access token cookie.
    pub const ACCESS_TOKEN: &str = "sAccessToken";
    /// Refresh token cookie.
    pub const REFRESH_TOKEN: &str = "sRefreshToken";
    /// Id-refresh token cookie.
    pub const ID_REFRESH_TOKEN: &str = "sIdRefreshToken";
}

/// Session header names.
pub mod headers {
    /// Anti-CSRF token, both directions.
    pub const ANTI_CSRF: &str = "anti-csrf";
    /// Id-refresh token mirror: `{token};{expiry_ms}` or `remove`.
    pub const ID_REFRESH_TOKEN: &str = "id-refresh-token";
    /// Base64 JSON summary of the access token for the frontend.
    pub const FRONT_TOKEN: &str = "front-token";
    /// Frontend SDK module id.
    pub const RID: &str = "rid";
}

/// Response `status` values.
pub mod status {
    /// Success.
    pub const OK: &str = "OK";
    /// Form validation failed.
    pub const FIELD_ERROR: &str = "FIELD_ERROR";
    /// Unknown email or wrong password.
    pub const WRONG_CREDENTIALS: &str = "WRONG_CREDENTIALS_ERROR";
    /// Sign-up with a taken email.
    pub const EMAIL_ALREADY_EXISTS: &str = "EMAIL_ALREADY_EXISTS_ERROR";
    /// Reset token unknown or expired.
    pub const RESET_PASSWORD_INVALID_TOKEN: &str = "RESET_PASSWORD_INVALID_TOKEN_ERROR";
    /// Verification token unknown or expired.
    pub const EMAIL_VERIFICATION_INVALID_TOKEN: &str = "EMAIL_VERIFICATION_INVALID_TOKEN_ERROR";
    /// Verification requested for an already verified email.
    pub const EMAIL_ALREADY_VERIFIED: &str = "EMAIL_ALREADY_VERIFIED_ERROR";
    /// Provider profile carried no email.
    pub const NO_EMAIL_GIVEN_BY_PROVIDER: &str = "NO_EMAIL_GIVEN_BY_PROVIDER";
}
