//! Session endpoints for cookie and bearer auth.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use super::state::{AuthConfig, AuthState};
use super::{store_error_response, unauthorized, SessionResponse};
use crate::auth::session::SessionError;

const SESSION_COOKIE_NAME: &str = "vestibule_session";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "No active session", body = super::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // A missing cookie is just an anonymous request, not an error worth logging.
    let Some(token) = extract_session_token(&headers) else {
        return unauthorized();
    };

    let user_id = match auth_state.sessions().validate(&token).await {
        Ok(user_id) => user_id,
        Err(SessionError::Store(err)) => {
            error!("Failed to validate session: {err}");
            return store_error_response(&err);
        }
        Err(err) => {
            info!(reason = err.kind(), "session rejected");
            return unauthorized();
        }
    };

    match auth_state.users().find_by_id(user_id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(SessionResponse {
                user_id: user.id.to_string(),
                email: user.email,
            }),
        )
            .into_response(),
        // Session outlived the user row; treat it as no session.
        Ok(None) => unauthorized(),
        Err(err) => {
            error!("Failed to load session user: {err}");
            store_error_response(&err)
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/signout",
    responses(
        (status = 200, description = "Session revoked and cookie cleared")
    ),
    tag = "auth"
)]
pub async fn signout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        match auth_state.sessions().revoke(&token).await {
            Ok(()) => {}
            Err(err) => {
                error!("Failed to revoke session: {err}");
                return store_error_response(&err);
            }
        }
    }

    // Always clear the cookie, even when no session token was presented.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::OK, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(super) fn session_cookie(
    auth_state: &AuthState,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = auth_state.config().session_ttl_seconds();
    let secure = auth_state.config().session_cookie_secure();
    let same_site = same_site_attribute(secure);
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite={same_site}; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(auth_config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = auth_config.session_cookie_secure();
    let same_site = same_site_attribute(secure);
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite={same_site}; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cross-site frontends need `SameSite=None`, which browsers only honor with
/// `Secure`. Plain-http dev stays on `Lax`.
fn same_site_attribute(secure: bool) -> &'static str {
    if secure {
        "None"
    } else {
        "Lax"
    }
}

pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        // Nameless fragments like "promo" are legal in a Cookie header;
        // skip them and keep scanning.
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
