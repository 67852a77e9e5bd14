//! Session lifecycle: token issuance, validation, and revocation.
//!
//! Tokens carry 256 bits from the OS RNG and travel exactly once, in the
//! Set-Cookie header; the store only ever sees the SHA-256 of the token.
//! A session is `Active` until its absolute expiry passes or it is revoked;
//! both are terminal.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::store::{now_unix, SessionRecord, SessionStore, StoreError};

#[derive(Debug)]
pub enum SessionError {
    NotFound,
    Expired,
    Revoked,
    Store(StoreError),
}

impl SessionError {
    /// Stable name for server-side logs; clients only ever see a generic
    /// unauthorized response.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "session_not_found",
            Self::Expired => "session_expired",
            Self::Revoked => "session_revoked",
            Self::Store(_) => "store_error",
        }
    }
}

pub struct SessionManager {
    sessions: Arc<dyn SessionStore>,
    ttl_seconds: i64,
    sliding: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionStore>, ttl_seconds: i64, sliding: bool) -> Self {
        Self {
            sessions,
            ttl_seconds,
            sliding,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Mint a session for `user_id` and return the raw token.
    ///
    /// # Errors
    /// Fails when the store is unreachable or no unique token could be
    /// generated (practically unreachable with 256-bit tokens).
    #[instrument(skip_all)]
    pub async fn issue(&self, user_id: Uuid) -> Result<String, StoreError> {
        let now = now_unix();
        for _ in 0..3 {
            let token = generate_session_token()
                .map_err(StoreError::Query)?;
            let created = self
                .sessions
                .create(SessionRecord {
                    token_hash: hash_session_token(&token),
                    user_id,
                    created_at_unix: now,
                    expires_at_unix: now + self.ttl_seconds,
                    revoked: false,
                })
                .await?;
            if created {
                return Ok(token);
            }
        }
        Err(StoreError::Query(anyhow!(
            "failed to generate unique session token"
        )))
    }

    /// Resolve a token to its owning user id.
    ///
    /// Expiry is checked lazily here; with sliding expiry enabled, a
    /// successful validation pushes the expiry forward (monotone, so
    /// concurrent validations of the same token are idempotent).
    ///
    /// # Errors
    /// `NotFound`, `Expired`, or `Revoked` for invalid tokens; `Store` when
    /// the backend fails. Revoked wins over expired for auditability.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Uuid, SessionError> {
        let token_hash = hash_session_token(token);
        let session = self
            .sessions
            .find_by_token_hash(&token_hash)
            .await
            .map_err(SessionError::Store)?
            .ok_or(SessionError::NotFound)?;

        if session.revoked {
            return Err(SessionError::Revoked);
        }
        let now = now_unix();
        if now >= session.expires_at_unix {
            return Err(SessionError::Expired);
        }

        if self.sliding {
            self.sessions
                .touch(&token_hash, now + self.ttl_seconds)
                .await
                .map_err(SessionError::Store)?;
        }

        Ok(session.user_id)
    }

    /// Revoke a token. Idempotent: revoking a revoked or unknown token is
    /// not an error.
    ///
    /// # Errors
    /// Only when the store is unreachable.
    #[instrument(skip_all)]
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.sessions
            .set_revoked(&hash_session_token(token))
            .await
    }
}

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the store keeps a hash.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session token so raw values never touch the store.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemorySessionStore;

    fn manager(store: Arc<MemorySessionStore>, sliding: bool) -> SessionManager {
        SessionManager::new(store, 3600, sliding)
    }

    #[test]
    fn generated_tokens_are_unique_and_long() {
        let first = generate_session_token().expect("token");
        let second = generate_session_token().expect("token");
        assert_ne!(first, second);
        // 32 bytes, base64url without padding.
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn token_hash_is_stable() {
        assert_eq!(hash_session_token("token"), hash_session_token("token"));
        assert_ne!(hash_session_token("token"), hash_session_token("other"));
    }

    #[tokio::test]
    async fn issue_then_validate_resolves_user() {
        let store = MemorySessionStore::new();
        let manager = manager(store, false);
        let user_id = Uuid::new_v4();

        let token = manager.issue(user_id).await.expect("issue");
        let resolved = manager.validate(&token).await.expect("validate");
        assert_eq!(resolved, user_id);
    }

    #[tokio::test]
    async fn unknown_token_not_found() {
        let store = MemorySessionStore::new();
        let manager = manager(store, false);
        let err = manager.validate("no-such-token").await.expect_err("invalid");
        assert!(matches!(err, SessionError::NotFound));
    }

    #[tokio::test]
    async fn expired_session_rejected() {
        let store = MemorySessionStore::new();
        let manager = manager(store.clone(), false);
        let token = manager.issue(Uuid::new_v4()).await.expect("issue");

        store
            .force_expiry(&hash_session_token(&token), now_unix() - 1)
            .await;
        let err = manager.validate(&token).await.expect_err("expired");
        assert!(matches!(err, SessionError::Expired));
    }

    #[tokio::test]
    async fn revoked_session_rejected_before_expiry() {
        let store = MemorySessionStore::new();
        let manager = manager(store, false);
        let token = manager.issue(Uuid::new_v4()).await.expect("issue");

        manager.revoke(&token).await.expect("revoke");
        let err = manager.validate(&token).await.expect_err("revoked");
        assert!(matches!(err, SessionError::Revoked));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemorySessionStore::new();
        let manager = manager(store, false);
        let token = manager.issue(Uuid::new_v4()).await.expect("issue");

        manager.revoke(&token).await.expect("first revoke");
        manager.revoke(&token).await.expect("second revoke");
        manager.revoke("never-issued").await.expect("unknown token");

        let err = manager.validate(&token).await.expect_err("revoked");
        assert!(matches!(err, SessionError::Revoked));
    }

    #[tokio::test]
    async fn sliding_validation_extends_expiry() {
        let store = MemorySessionStore::new();
        let manager = manager(store.clone(), true);
        let token = manager.issue(Uuid::new_v4()).await.expect("issue");
        let token_hash = hash_session_token(&token);

        // Shrink the window, then validate: expiry must move forward again.
        store.force_expiry(&token_hash, now_unix() + 10).await;
        manager.validate(&token).await.expect("validate");
        let extended = store.expiry_of(&token_hash).await.expect("session");
        assert!(extended >= now_unix() + 3600 - 1);
    }

    #[tokio::test]
    async fn fixed_ttl_validation_does_not_extend() {
        let store = MemorySessionStore::new();
        let manager = manager(store.clone(), false);
        let token = manager.issue(Uuid::new_v4()).await.expect("issue");
        let token_hash = hash_session_token(&token);

        let before = store.expiry_of(&token_hash).await.expect("session");
        manager.validate(&token).await.expect("validate");
        let after = store.expiry_of(&token_hash).await.expect("session");
        assert_eq!(before, after);
    }
}
