//! OpenAPI document for the auth API.

use utoipa::OpenApi;

use super::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::signup::signup,
        auth::signin::signin,
        auth::session::session,
        auth::session::signout,
        auth::verification::verify_email,
        auth::verification::request_password_reset,
        auth::verification::reset_password,
    ),
    components(schemas(
        health::Health,
        auth::CredentialsRequest,
        auth::UserResponse,
        auth::SessionResponse,
        auth::VerifyEmailRequest,
        auth::PasswordResetRequest,
        auth::ResetPasswordRequest,
        auth::ErrorBody,
    )),
    tags(
        (name = "auth", description = "Signup, signin, sessions, and email flows. \
            Documented paths use the default /v1/auth prefix; when the service \
            runs with a different --auth-base-path, substitute that prefix."),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
