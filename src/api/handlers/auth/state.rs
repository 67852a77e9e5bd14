//! Auth configuration and shared per-process state.

use anyhow::Result;
use std::sync::Arc;

use crate::api::email::EmailHooks;
use crate::auth::session::SessionManager;
use crate::auth::tokens::EmailTokens;
use crate::auth::validator::{PasswordPolicy, Validator};
use crate::store::{EmailTokenStore, SessionStore, UserStore};

const DEFAULT_AUTH_BASE_PATH: &str = "/v1/auth";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_EMAIL_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;
const DEFAULT_MAX_PASSWORD_LENGTH: usize = 128;

/// Process-wide auth policy, built once at startup from CLI/env and passed
/// into constructors. Request handling never reads configuration ad hoc.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_origin: String,
    auth_base_path: String,
    session_ttl_seconds: i64,
    session_sliding: bool,
    min_password_length: usize,
    max_password_length: usize,
    email_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_origin: String) -> Self {
        Self {
            base_origin,
            auth_base_path: DEFAULT_AUTH_BASE_PATH.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            session_sliding: false,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            max_password_length: DEFAULT_MAX_PASSWORD_LENGTH,
            email_token_ttl_seconds: DEFAULT_EMAIL_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_auth_base_path(mut self, path: String) -> Self {
        self.auth_base_path = path;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_sliding(mut self, sliding: bool) -> Self {
        self.session_sliding = sliding;
        self
    }

    #[must_use]
    pub fn with_password_length_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_password_length = min;
        self.max_password_length = max.max(min);
        self
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn base_origin(&self) -> &str {
        &self.base_origin
    }

    #[must_use]
    pub fn auth_base_path(&self) -> &str {
        &self.auth_base_path
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn session_sliding(&self) -> bool {
        self.session_sliding
    }

    #[must_use]
    pub fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }

    #[must_use]
    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy::new(self.min_password_length, self.max_password_length)
    }

    /// Only mark cookies secure when the trusted origin is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.base_origin.starts_with("https://")
    }
}

/// Everything a request handler needs, shared via an `Extension`.
pub struct AuthState {
    config: AuthConfig,
    validator: Validator,
    sessions: SessionManager,
    tokens: EmailTokens,
    users: Arc<dyn UserStore>,
    hooks: Arc<dyn EmailHooks>,
}

impl AuthState {
    /// # Errors
    /// Fails only if the validator's decoy hash cannot be computed.
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        email_tokens: Arc<dyn EmailTokenStore>,
        hooks: Arc<dyn EmailHooks>,
    ) -> Result<Self> {
        let validator = Validator::new(users.clone(), config.password_policy())?;
        let sessions = SessionManager::new(
            sessions,
            config.session_ttl_seconds(),
            config.session_sliding(),
        );
        let tokens = EmailTokens::new(email_tokens, config.email_token_ttl_seconds());
        Ok(Self {
            config,
            validator,
            sessions,
            tokens,
            users,
            hooks,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn tokens(&self) -> &EmailTokens {
        &self.tokens
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    #[must_use]
    pub fn hooks(&self) -> &dyn EmailHooks {
        self.hooks.as_ref()
    }
}
