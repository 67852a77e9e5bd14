//! In-memory stores used by the test suite and `memory:` DSNs in local dev.
//!
//! Maps live behind a `tokio::sync::Mutex`, so operations on the same token
//! serialize: once a revoke's effect is in the map, no concurrent validate
//! can observe the session as live.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    now_unix, CreateUserOutcome, EmailTokenStore, NewUser, SessionRecord, SessionStore,
    StoreError, TokenPurpose, UserRecord, UserStore,
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create(&self, user: NewUser) -> Result<CreateUserOutcome, StoreError> {
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Ok(CreateUserOutcome::DuplicateEmail);
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            email_verified: false,
            created_at_unix: now_unix(),
        };
        users.insert(record.id, record.clone());
        Ok(CreateUserOutcome::Created(record))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.get(&id).cloned())
    }

    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.email_verified = true;
        }
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.get_mut(&id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<Vec<u8>, SessionRecord>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Test helper: rewrite a session's expiry to simulate the passage of time.
    pub async fn force_expiry(&self, token_hash: &[u8], expires_at_unix: i64) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(token_hash) {
            session.expires_at_unix = expires_at_unix;
        }
    }

    /// Test helper: read back a session's current expiry.
    pub async fn expiry_of(&self, token_hash: &[u8]) -> Option<i64> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(token_hash)
            .map(|session| session.expires_at_unix)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: SessionRecord) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&session.token_hash) {
            return Ok(false);
        }
        sessions.insert(session.token_hash.clone(), session);
        Ok(true)
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<SessionRecord>, StoreError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(token_hash).cloned())
    }

    async fn set_revoked(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(token_hash) {
            session.revoked = true;
        }
        Ok(())
    }

    async fn touch(&self, token_hash: &[u8], expires_at_unix: i64) -> Result<(), StoreError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(token_hash) {
            if !session.revoked {
                session.expires_at_unix = session.expires_at_unix.max(expires_at_unix);
            }
        }
        Ok(())
    }
}

struct EmailTokenEntry {
    user_id: Uuid,
    purpose: TokenPurpose,
    expires_at_unix: i64,
    consumed: bool,
}

#[derive(Default)]
pub struct MemoryEmailTokenStore {
    tokens: Mutex<HashMap<Vec<u8>, EmailTokenEntry>>,
}

impl MemoryEmailTokenStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Test helper: rewrite a token's expiry.
    pub async fn force_expiry(&self, token_hash: &[u8], expires_at_unix: i64) {
        let mut tokens = self.tokens.lock().await;
        if let Some(entry) = tokens.get_mut(token_hash) {
            entry.expires_at_unix = expires_at_unix;
        }
    }
}

#[async_trait]
impl EmailTokenStore for MemoryEmailTokenStore {
    async fn insert(
        &self,
        token_hash: &[u8],
        user_id: Uuid,
        purpose: TokenPurpose,
        expires_at_unix: i64,
    ) -> Result<(), StoreError> {
        let mut tokens = self.tokens.lock().await;
        tokens.insert(
            token_hash.to_vec(),
            EmailTokenEntry {
                user_id,
                purpose,
                expires_at_unix,
                consumed: false,
            },
        );
        Ok(())
    }

    async fn consume(
        &self,
        token_hash: &[u8],
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tokens = self.tokens.lock().await;
        let Some(entry) = tokens.get_mut(token_hash) else {
            return Ok(None);
        };
        if entry.consumed || entry.purpose != purpose || entry.expires_at_unix <= now_unix() {
            return Ok(None);
        }
        entry.consumed = true;
        Ok(Some(entry.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(token_hash: &[u8], expires_at_unix: i64) -> SessionRecord {
        SessionRecord {
            token_hash: token_hash.to_vec(),
            user_id: Uuid::new_v4(),
            created_at_unix: now_unix(),
            expires_at_unix,
            revoked: false,
        }
    }

    #[tokio::test]
    async fn duplicate_email_reported_as_outcome() {
        let store = MemoryUserStore::new();
        let outcome = store
            .create(NewUser {
                email: "a@x.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .expect("create");
        assert!(matches!(outcome, CreateUserOutcome::Created(_)));

        let outcome = store
            .create(NewUser {
                email: "a@x.com".to_string(),
                password_hash: "other".to_string(),
            })
            .await
            .expect("create");
        assert!(matches!(outcome, CreateUserOutcome::DuplicateEmail));
    }

    #[tokio::test]
    async fn session_create_rejects_hash_collision() {
        let store = MemorySessionStore::new();
        let expires = now_unix() + 60;
        assert!(store.create(session(b"hash", expires)).await.expect("create"));
        assert!(!store.create(session(b"hash", expires)).await.expect("create"));
    }

    #[tokio::test]
    async fn touch_is_monotone_and_skips_revoked() {
        let store = MemorySessionStore::new();
        let expires = now_unix() + 60;
        store
            .create(session(b"hash", expires))
            .await
            .expect("create");

        store.touch(b"hash", expires - 30).await.expect("touch");
        assert_eq!(store.expiry_of(b"hash").await, Some(expires));

        store.touch(b"hash", expires + 30).await.expect("touch");
        assert_eq!(store.expiry_of(b"hash").await, Some(expires + 30));

        store.set_revoked(b"hash").await.expect("revoke");
        store.touch(b"hash", expires + 300).await.expect("touch");
        assert_eq!(store.expiry_of(b"hash").await, Some(expires + 30));
    }

    #[tokio::test]
    async fn revoke_dominates_concurrent_validate() {
        let store = MemorySessionStore::new();
        store
            .create(session(b"hash", now_unix() + 60))
            .await
            .expect("create");

        let revoke = store.set_revoked(b"hash");
        let lookup = store.find_by_token_hash(b"hash");
        let (revoked, found) = tokio::join!(revoke, lookup);
        revoked.expect("revoke");

        // Whatever interleaving happened, a second lookup must observe the revoke.
        let _ = found.expect("lookup");
        let after = store
            .find_by_token_hash(b"hash")
            .await
            .expect("lookup")
            .expect("session exists");
        assert!(after.revoked);
    }

    #[tokio::test]
    async fn email_token_single_use_and_purpose_bound() {
        let store = MemoryEmailTokenStore::new();
        let user_id = Uuid::new_v4();
        store
            .insert(b"token", user_id, TokenPurpose::VerifyEmail, now_unix() + 60)
            .await
            .expect("insert");

        let wrong_purpose = store
            .consume(b"token", TokenPurpose::PasswordReset)
            .await
            .expect("consume");
        assert_eq!(wrong_purpose, None);

        let first = store
            .consume(b"token", TokenPurpose::VerifyEmail)
            .await
            .expect("consume");
        assert_eq!(first, Some(user_id));

        let second = store
            .consume(b"token", TokenPurpose::VerifyEmail)
            .await
            .expect("consume");
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn email_token_expiry_enforced() {
        let store = MemoryEmailTokenStore::new();
        let user_id = Uuid::new_v4();
        store
            .insert(b"token", user_id, TokenPurpose::VerifyEmail, now_unix() + 60)
            .await
            .expect("insert");
        store.force_expiry(b"token", now_unix() - 1).await;

        let consumed = store
            .consume(b"token", TokenPurpose::VerifyEmail)
            .await
            .expect("consume");
        assert_eq!(consumed, None);
    }
}
