//! Auth endpoint handlers: signup, signin, signout, session check, email
//! verification, and password reset. Request/response payloads and the
//! outcome-to-status mapping live here; the actual rules are enforced by
//! [`crate::auth`].

pub mod session;
pub mod signin;
pub mod signup;
pub mod state;
pub mod verification;

pub use state::{AuthConfig, AuthState};

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::validator::SignUpError;
use crate::store::StoreError;

#[derive(ToSchema, Deserialize, Debug)]
pub struct CredentialsRequest {
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub user_id: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

/// Machine-readable error kind; validation kinds are safe to display,
/// authentication failures always collapse to `unauthorized`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, kind: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: kind.to_string(),
        }),
    )
        .into_response()
}

/// Generic 401; the specific reason stays in server logs.
pub(crate) fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "unauthorized")
}

/// Infrastructure failures are 5xx, never conflated with auth outcomes.
pub(crate) fn store_error_response(err: &StoreError) -> Response {
    if err.is_unavailable() {
        error_response(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
    } else {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    }
}

pub(crate) fn signup_error_response(err: &SignUpError) -> Response {
    match err {
        SignUpError::EmailAlreadyRegistered => {
            error_response(StatusCode::CONFLICT, "email_already_registered")
        }
        SignUpError::InvalidEmailFormat => {
            error_response(StatusCode::BAD_REQUEST, "invalid_email_format")
        }
        SignUpError::PasswordTooShort => {
            error_response(StatusCode::BAD_REQUEST, "password_too_short")
        }
        SignUpError::PasswordTooLong => {
            error_response(StatusCode::BAD_REQUEST, "password_too_long")
        }
        SignUpError::Hasher(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
        SignUpError::Store(store_err) => store_error_response(store_err),
    }
}
