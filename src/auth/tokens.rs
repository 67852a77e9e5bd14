//! Single-use email tokens for verification and password reset links.
//!
//! Same at-rest policy as sessions: the raw token goes into the email link,
//! the store keeps only a SHA-256. Consumption is a conditional update, so a
//! token is good for exactly one redemption before its TTL elapses.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{now_unix, EmailTokenStore, StoreError, TokenPurpose};

pub struct EmailTokens {
    store: Arc<dyn EmailTokenStore>,
    ttl_seconds: i64,
}

impl EmailTokens {
    #[must_use]
    pub fn new(store: Arc<dyn EmailTokenStore>, ttl_seconds: i64) -> Self {
        Self { store, ttl_seconds }
    }

    /// Mint a token bound to `user_id` and `purpose`, returning the raw value
    /// for the email link.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn issue(&self, user_id: Uuid, purpose: TokenPurpose) -> Result<String, StoreError> {
        let token = generate_email_token().map_err(StoreError::Query)?;
        self.store
            .insert(
                &hash_email_token(&token),
                user_id,
                purpose,
                now_unix() + self.ttl_seconds,
            )
            .await?;
        Ok(token)
    }

    /// Redeem a token once. Returns the owning user id, or `None` for
    /// unknown, expired, consumed, or wrong-purpose tokens.
    ///
    /// # Errors
    /// Store failures only.
    pub async fn consume(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>, StoreError> {
        self.store.consume(&hash_email_token(token), purpose).await
    }
}

fn generate_email_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate email token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

fn hash_email_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}
