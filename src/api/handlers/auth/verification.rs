//! Email verification and password reset endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::state::AuthState;
use super::{
    error_response, signup_error_response, store_error_response, PasswordResetRequest,
    ResetPasswordRequest, VerifyEmailRequest,
};
use crate::api::email::build_reset_url;
use crate::auth::password;
use crate::auth::validator::{normalize_email, valid_email};
use crate::store::TokenPurpose;

/// Consume the emailed token and mark the owning account verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid or expired token", body = super::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    _headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "missing_payload"),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_token");
    }

    let user_id = match auth_state
        .tokens()
        .consume(token, TokenPurpose::VerifyEmail)
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "invalid_token"),
        Err(err) => {
            error!("Failed to consume verification token: {err}");
            return store_error_response(&err);
        }
    };

    match auth_state.users().set_email_verified(user_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to mark email verified: {err}");
            store_error_response(&err)
        }
    }
}

/// Request a password reset link. Always answers 202 so the endpoint cannot
/// be used to probe which emails have accounts.
#[utoipa::path(
    post,
    path = "/v1/auth/request-password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Reset email sent if the account exists"),
        (status = 400, description = "Missing payload", body = super::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    _headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "missing_payload"),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Still 202: a malformed address reveals nothing either way.
        return StatusCode::ACCEPTED.into_response();
    }

    let user = match auth_state.users().find_by_email(&email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Password reset lookup failed: {err}");
            return store_error_response(&err);
        }
    };

    if let Some(user) = user {
        match auth_state
            .tokens()
            .issue(user.id, TokenPurpose::PasswordReset)
            .await
        {
            Ok(token) => {
                let reset_url = build_reset_url(auth_state.config().base_origin(), &token);
                if let Err(err) = auth_state
                    .hooks()
                    .password_reset_issued(&user.email, &reset_url)
                {
                    warn!("Password reset email hook failed: {err}");
                }
            }
            Err(err) => {
                error!("Failed to issue password reset token: {err}");
            }
        }
    } else {
        info!("password reset requested for unknown email");
    }

    StatusCode::ACCEPTED.into_response()
}

/// Redeem a reset token and install the new password.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid token or password", body = super::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    _headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "missing_payload"),
    };

    // Reject bad passwords before burning the single-use token.
    if let Err(err) = auth_state.validator().check_password_policy(&request.password) {
        return signup_error_response(&err);
    }

    let token = request.token.trim();
    if token.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid_token");
    }

    let user_id = match auth_state
        .tokens()
        .consume(token, TokenPurpose::PasswordReset)
        .await
    {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "invalid_token"),
        Err(err) => {
            error!("Failed to consume reset token: {err}");
            return store_error_response(&err);
        }
    };

    let password_hash = match password::hash(request.password.expose_secret()) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash new password: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error");
        }
    };

    match auth_state
        .users()
        .set_password_hash(user_id, &password_hash)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to update password: {err}");
            store_error_response(&err)
        }
    }
}
