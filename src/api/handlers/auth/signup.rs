//! Account creation endpoint.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use super::state::AuthState;
use super::{error_response, signup_error_response, CredentialsRequest, UserResponse};
use crate::api::email::build_verify_url;
use crate::store::TokenPurpose;

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = CredentialsRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Validation error", body = super::ErrorBody),
        (status = 409, description = "Email already registered", body = super::ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signup(
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
        .sign_up(&request.email, &request.password)
        .await
    {
        Ok(user) => user,
        Err(err) => return signup_error_response(&err),
    };

    // The account exists either way; a failed verification email only delays
    // activation and can be retried through the reset flow.
    match auth_state
        .tokens()
        .issue(user.id, TokenPurpose::VerifyEmail)
        .await
    {
        Ok(token) => {
            let verify_url = build_verify_url(auth_state.config().base_origin(), &token);
            if let Err(err) = auth_state.hooks().verification_issued(&user.email, &verify_url) {
                warn!("Verification email hook failed: {err}");
            }
        }
        Err(err) => {
            error!("Failed to issue verification token: {err}");
        }
    }

    (
        StatusCode::CREATED,
        Json(UserResponse {
            user_id: user.id.to_string(),
            email: user.email,
        }),
    )
        .into_response()
}
