//! Writing and clearing the session token triad.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use keyward_core::{RequestContext, SetCookie};
use serde_json::{Value, json};

use crate::config::SessionSettings;
use crate::constants::{cookies, headers};
use crate::providers::{CreatedSession, TokenInfo};
use crate::utils::from_millis;

fn cookie(
    settings: &SessionSettings,
    name: &str,
    value: &str,
    expires: DateTime<Utc>,
    path: &str,
) -> SetCookie {
    SetCookie {
        name: name.to_string(),
        value: value.to_string(),
        expires,
        domain: settings.cookie_domain.clone(),
        path: path.to_string(),
        http_only: true,
        secure: settings.cookie_secure,
        same_site: settings.cookie_same_site,
    }
}

/// Base64 JSON the frontend reads to learn the user id, access token
/// expiry and payload without seeing the token.
#[must_use]
pub fn front_token(user_id: &str, access_token_expiry: i64, payload: &Value) -> String {
    let summary = json!({
        "uid": user_id,
        "ate": access_token_expiry,
        "up": payload,
    });
    STANDARD.encode(summary.to_string())
}

/// Write a freshly minted triad plus its companion headers.
pub fn attach_tokens(ctx: &mut RequestContext, settings: &SessionSettings, created: &CreatedSession) {
    ctx.set_cookie(cookie(
        settings,
        cookies::ACCESS_TOKEN,
        &created.access_token.token,
        from_millis(created.access_token.expiry),
        "/",
    ));
    ctx.set_cookie(cookie(
        settings,
        cookies::REFRESH_TOKEN,
        &created.refresh_token.token,
        from_millis(created.refresh_token.expiry),
        &settings.refresh_token_path,
    ));
    ctx.set_cookie(cookie(
        settings,
        cookies::ID_REFRESH_TOKEN,
        &created.id_refresh_token.token,
        from_millis(created.id_refresh_token.expiry),
        "/",
    ));

    ctx.set_header(
        headers::ID_REFRESH_TOKEN,
        &format!(
            "{};{}",
            created.id_refresh_token.token, created.id_refresh_token.expiry
        ),
    );
    ctx.expose_header(headers::ID_REFRESH_TOKEN);

    ctx.set_header(
        headers::FRONT_TOKEN,
        &front_token(
            &created.session.user_id,
            created.access_token.expiry,
            &created.session.user_data_in_jwt,
        ),
    );
    ctx.expose_header(headers::FRONT_TOKEN);

    if let Some(anti_csrf) = &created.anti_csrf_token {
        ctx.set_header(headers::ANTI_CSRF, anti_csrf);
        ctx.expose_header(headers::ANTI_CSRF);
    }
}

/// Write a replacement access token issued by the core, leaving the
/// refresh and id-refresh cookies as they are.
pub fn attach_access_token(
    ctx: &mut RequestContext,
    settings: &SessionSettings,
    access_token: &TokenInfo,
    user_id: &str,
    payload: &Value,
) {
    ctx.set_cookie(cookie(
        settings,
        cookies::ACCESS_TOKEN,
        &access_token.token,
        from_millis(access_token.expiry),
        "/",
    ));
    ctx.set_header(
        headers::FRONT_TOKEN,
        &front_token(user_id, access_token.expiry, payload),
    );
    ctx.expose_header(headers::FRONT_TOKEN);
}

/// Expire all three cookies and tell the frontend to drop its mirror.
pub fn clear_tokens(ctx: &mut RequestContext, settings: &SessionSettings) {
    let epoch = DateTime::<Utc>::UNIX_EPOCH;
    ctx.set_cookie(cookie(settings, cookies::ACCESS_TOKEN, "", epoch, "/"));
    ctx.set_cookie(cookie(
        settings,
        cookies::REFRESH_TOKEN,
        "",
        epoch,
        &settings.refresh_token_path,
    ));
    ctx.set_cookie(cookie(settings, cookies::ID_REFRESH_TOKEN, "", epoch, "/"));
    ctx.set_header(headers::ID_REFRESH_TOKEN, "remove");
    ctx.expose_header(headers::ID_REFRESH_TOKEN);
}
