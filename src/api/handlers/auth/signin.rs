//! Credential sign-in endpoint.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::session::session_cookie;
use super::state::AuthState;
use super::{error_response, store_error_response, CredentialsRequest, UserResponse};
use crate::auth::validator::SignInError;

#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Signed in, session cookie set", body = UserResponse),
        (status = 401, description = "Invalid credentials", body = super::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signin(
    _headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CredentialsRequest>>,
) -> impl IntoResponse {
    let request: CredentialsRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, "missing_payload"),
    };

    let user = match auth_state
        .validator()
        .sign_in(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        // Same body for unknown email and wrong password.
        Err(SignInError::InvalidCredentials) => {
            return error_response(StatusCode::UNAUTHORIZED, "invalid_credentials")
        }
        Err(SignInError::Store(err)) => {
            error!("Sign-in lookup failed: {err}");
            return store_error_response(&err);
        }
    };

    let token = match auth_state.sessions().issue(user.id).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue session: {err}");
            return store_error_response(&err);
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(&auth_state, &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error");
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(UserResponse {
            user_id: user.id.to_string(),
            email: user.email,
        }),
    )
        .into_response()
}
