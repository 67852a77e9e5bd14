use crate::api;
use crate::api::handlers::auth::AuthConfig;
use crate::cli::actions::Action;
use anyhow::Result;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            base_origin,
            auth_base_path,
            session_ttl_seconds,
            session_sliding,
            min_password_length,
            max_password_length,
            email_token_ttl_seconds,
        } => {
            let auth_config = AuthConfig::new(base_origin)
                .with_auth_base_path(auth_base_path)
                .with_session_ttl_seconds(session_ttl_seconds)
                .with_session_sliding(session_sliding)
                .with_password_length_bounds(min_password_length, max_password_length)
                .with_email_token_ttl_seconds(email_token_ttl_seconds);

            api::new(port, dsn, auth_config).await?;
        }
    }

    Ok(())
}
