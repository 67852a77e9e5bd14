//! Hook points for email collaborators.
//!
//! The core mints verification and reset tokens and builds the frontend
//! links, but message dispatch belongs to whoever implements [`EmailHooks`]
//! (SMTP, provider API, queue, ...). The default [`LogEmailHooks`] logs and
//! returns `Ok`, which keeps the flows a valid no-op in local dev.

use anyhow::Result;
use tracing::info;

/// Called synchronously when the auth flows produce an email-worthy event.
pub trait EmailHooks: Send + Sync {
    /// A verification token was issued for a fresh or re-requested signup.
    ///
    /// # Errors
    /// Implementations may fail; the caller logs and continues, the auth
    /// operation itself is already committed.
    fn verification_issued(&self, email: &str, verify_url: &str) -> Result<()>;

    /// A password reset token was issued.
    ///
    /// # Errors
    /// Same contract as [`EmailHooks::verification_issued`].
    fn password_reset_issued(&self, email: &str, reset_url: &str) -> Result<()>;
}

/// Local dev hooks that log the link instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailHooks;

impl EmailHooks for LogEmailHooks {
    fn verification_issued(&self, email: &str, verify_url: &str) -> Result<()> {
        info!(email, verify_url, "verification email hook");
        Ok(())
    }

    fn password_reset_issued(&self, email: &str, reset_url: &str) -> Result<()> {
        info!(email, reset_url, "password reset email hook");
        Ok(())
    }
}

/// Build the frontend verification link included in outbound emails.
pub(crate) fn build_verify_url(base_origin: &str, token: &str) -> String {
    let base = base_origin.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

/// Build the frontend password reset link.
pub(crate) fn build_reset_url(base_origin: &str, token: &str) -> String {
    let base = base_origin.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_url_trims_trailing_slash() {
        let url = build_verify_url("https://example.com/", "token");
        assert_eq!(url, "https://example.com/verify-email#token=token");
    }

    #[test]
    fn reset_url_embeds_token_in_fragment() {
        let url = build_reset_url("https://example.com", "abc");
        assert_eq!(url, "https://example.com/reset-password#token=abc");
    }

    #[test]
    fn log_hooks_are_a_valid_noop() {
        let hooks = LogEmailHooks;
        assert!(hooks
            .verification_issued("a@x.com", "https://example.com/verify")
            .is_ok());
        assert!(hooks
            .password_reset_issued("a@x.com", "https://example.com/reset")
            .is_ok());
    }
}
