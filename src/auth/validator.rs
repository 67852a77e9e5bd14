//! Credential validation: password policy, email format, sign-up and sign-in
//! orchestration over the user store.

use anyhow::Result;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::instrument;

use crate::auth::password;
use crate::store::{CreateUserOutcome, NewUser, StoreError, UserRecord, UserStore};

const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;
const DEFAULT_MAX_PASSWORD_LENGTH: usize = 128;

/// Configured length bounds for passwords. Bounds are inclusive.
#[derive(Clone, Copy, Debug)]
pub struct PasswordPolicy {
    min_length: usize,
    max_length: usize,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_PASSWORD_LENGTH,
            max_length: DEFAULT_MAX_PASSWORD_LENGTH,
        }
    }
}

impl PasswordPolicy {
    #[must_use]
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length,
            max_length: max_length.max(min_length),
        }
    }

    #[must_use]
    pub fn min_length(&self) -> usize {
        self.min_length
    }

    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

#[derive(Debug)]
pub enum SignUpError {
    EmailAlreadyRegistered,
    InvalidEmailFormat,
    PasswordTooShort,
    PasswordTooLong,
    Hasher(anyhow::Error),
    Store(StoreError),
}

#[derive(Debug)]
pub enum SignInError {
    InvalidCredentials,
    Store(StoreError),
}

pub struct Validator {
    users: Arc<dyn UserStore>,
    policy: PasswordPolicy,
    // Verified against when no user matches the email, so unknown-email and
    // wrong-password take the same code path and comparable time.
    decoy_hash: String,
}

impl Validator {
    /// # Errors
    /// Fails only if the decoy hash cannot be computed.
    pub fn new(users: Arc<dyn UserStore>, policy: PasswordPolicy) -> Result<Self> {
        let decoy_hash = password::hash("decoy-credential-never-matches")?;
        Ok(Self {
            users,
            policy,
            decoy_hash,
        })
    }

    #[must_use]
    pub fn policy(&self) -> PasswordPolicy {
        self.policy
    }

    /// Check a candidate password against the configured length bounds.
    ///
    /// # Errors
    /// `PasswordTooShort` / `PasswordTooLong` outside the inclusive bounds.
    pub fn check_password_policy(&self, password: &SecretString) -> Result<(), SignUpError> {
        let length = password.expose_secret().chars().count();
        if length < self.policy.min_length {
            return Err(SignUpError::PasswordTooShort);
        }
        if length > self.policy.max_length {
            return Err(SignUpError::PasswordTooLong);
        }
        Ok(())
    }

    /// Register a new user.
    ///
    /// # Errors
    /// Validation errors for email/password policy, `EmailAlreadyRegistered`
    /// on a duplicate, or a store/hasher failure.
    #[instrument(skip_all)]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<UserRecord, SignUpError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(SignUpError::InvalidEmailFormat);
        }
        self.check_password_policy(password)?;

        let password_hash =
            password::hash(password.expose_secret()).map_err(SignUpError::Hasher)?;

        let outcome = self
            .users
            .create(NewUser {
                email,
                password_hash,
            })
            .await
            .map_err(SignUpError::Store)?;

        match outcome {
            CreateUserOutcome::Created(user) => Ok(user),
            CreateUserOutcome::DuplicateEmail => Err(SignUpError::EmailAlreadyRegistered),
        }
    }

    /// Authenticate an (email, password) pair.
    ///
    /// Unknown email and wrong password are indistinguishable: both return
    /// `InvalidCredentials`, and the unknown-email path still runs a full
    /// Argon2 verification against the decoy hash.
    ///
    /// # Errors
    /// `InvalidCredentials`, or `Store` when the backend is unreachable.
    #[instrument(skip_all)]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<UserRecord, SignInError> {
        let email = normalize_email(email);
        let user = self
            .users
            .find_by_email(&email)
            .await
            .map_err(SignInError::Store)?;

        match user {
            Some(user) => {
                if password::verify(password.expose_secret(), &user.password_hash) {
                    Ok(user)
                } else {
                    Err(SignInError::InvalidCredentials)
                }
            }
            None => {
                let _ = password::verify(password.expose_secret(), &self.decoy_hash);
                Err(SignInError::InvalidCredentials)
            }
        }
    }
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryUserStore;

    fn secret(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn validator() -> Validator {
        Validator::new(MemoryUserStore::new(), PasswordPolicy::default()).expect("validator")
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_resolves_same_user() {
        let validator = validator();
        let created = validator
            .sign_up("a@x.com", &secret("password123"))
            .await
            .expect("sign up");
        assert!(!created.email_verified);

        let signed_in = validator
            .sign_in("a@x.com", &secret("password123"))
            .await
            .expect("sign in");
        assert_eq!(signed_in.id, created.id);
    }

    #[tokio::test]
    async fn duplicate_email_rejected_regardless_of_password() {
        let validator = validator();
        validator
            .sign_up("a@x.com", &secret("password123"))
            .await
            .expect("sign up");

        let err = validator
            .sign_up("A@X.com", &secret("differentpassword"))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, SignUpError::EmailAlreadyRegistered));
    }

    #[tokio::test]
    async fn password_bounds_inclusive() {
        let validator = Validator::new(MemoryUserStore::new(), PasswordPolicy::new(8, 12))
            .expect("validator");

        assert!(validator
            .sign_up("min@x.com", &secret("12345678"))
            .await
            .is_ok());
        assert!(validator
            .sign_up("max@x.com", &secret("123456789012"))
            .await
            .is_ok());

        let err = validator
            .sign_up("short@x.com", &secret("1234567"))
            .await
            .expect_err("too short");
        assert!(matches!(err, SignUpError::PasswordTooShort));

        let err = validator
            .sign_up("long@x.com", &secret("1234567890123"))
            .await
            .expect_err("too long");
        assert!(matches!(err, SignUpError::PasswordTooLong));
    }

    #[tokio::test]
    async fn malformed_email_rejected() {
        let validator = validator();
        let err = validator
            .sign_up("not-an-email", &secret("password123"))
            .await
            .expect_err("invalid email");
        assert!(matches!(err, SignUpError::InvalidEmailFormat));
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_fail_identically() {
        let validator = validator();
        validator
            .sign_up("a@x.com", &secret("password123"))
            .await
            .expect("sign up");

        let unknown = validator
            .sign_in("nobody@x.com", &secret("password123"))
            .await
            .expect_err("unknown email");
        let wrong = validator
            .sign_in("a@x.com", &secret("wrongpassword"))
            .await
            .expect_err("wrong password");

        assert!(matches!(unknown, SignInError::InvalidCredentials));
        assert!(matches!(wrong, SignInError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_takes_comparable_time_to_wrong_password() {
        let validator = validator();
        validator
            .sign_up("a@x.com", &secret("password123"))
            .await
            .expect("sign up");

        // Warm-up so first-use costs don't skew either side.
        let _ = validator.sign_in("a@x.com", &secret("wrongpassword")).await;
        let _ = validator.sign_in("nobody@x.com", &secret("password123")).await;

        let started = std::time::Instant::now();
        for _ in 0..3 {
            let _ = validator.sign_in("a@x.com", &secret("wrongpassword")).await;
        }
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        for _ in 0..3 {
            let _ = validator
                .sign_in("nobody@x.com", &secret("password123"))
                .await;
        }
        let unknown_email = started.elapsed();

        // The unknown-email path runs a full Argon2 verification against the
        // decoy hash, so it must not be drastically cheaper than a real
        // verification. Coarse bound to stay robust on loaded CI hosts.
        assert!(
            unknown_email * 5 > wrong_password,
            "unknown email: {unknown_email:?}, wrong password: {wrong_password:?}"
        );
    }
}
