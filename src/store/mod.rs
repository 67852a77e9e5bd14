//! Repository interfaces for user, session, and email token records.
//!
//! The core never talks to a database directly; it goes through these traits
//! so the Postgres backend and the in-memory backend (tests, `memory:` DSNs)
//! are interchangeable. All operations are atomic on the store side: unique
//! email is enforced by `create`, and revocation/consumption are conditional
//! updates, never read-modify-write in the caller.

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Store failures split into "backend unreachable/timed out" and everything
/// else, so the HTTP boundary can answer 503 vs 500 and never confuse an
/// outage with a missing record.
#[derive(Debug)]
pub enum StoreError {
    Unavailable(anyhow::Error),
    Query(anyhow::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(err) => write!(f, "store unavailable: {err}"),
            Self::Query(err) => write!(f, "store query failed: {err}"),
        }
    }
}

/// A persisted user. `password_hash` is a PHC string and must never leave
/// the auth core in any response payload.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at_unix: i64,
}

/// Input for `UserStore::create`. The id and timestamps are assigned by the
/// store so both backends agree on who owns them.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
}

/// Outcome of a create attempt; duplicate email is a domain outcome, not an
/// error, so callers match on it explicitly.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(UserRecord),
    DuplicateEmail,
}

/// A persisted session. Only the SHA-256 of the bearer token is stored; the
/// raw token exists once, in the Set-Cookie header.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub created_at_unix: i64,
    pub expires_at_unix: i64,
    pub revoked: bool,
}

/// Purpose tag for single-use email tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    PasswordReset,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::PasswordReset => "password_reset",
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Create a user, enforcing unique (normalized) email atomically.
    async fn create(&self, user: NewUser) -> Result<CreateUserOutcome, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Flip `email_verified` to true. No-op if already verified.
    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError>;

    /// Replace the stored password hash (password reset flow).
    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session. Returns `false` on a token-hash collision so the
    /// caller can regenerate instead of failing the sign-in.
    async fn create(&self, session: SessionRecord) -> Result<bool, StoreError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Mark a session revoked. Idempotent; unknown hashes are fine.
    async fn set_revoked(&self, token_hash: &[u8]) -> Result<(), StoreError>;

    /// Push `expires_at` forward to `expires_at_unix` if that is later than
    /// the current value (monotone, so concurrent touches are idempotent).
    async fn touch(&self, token_hash: &[u8], expires_at_unix: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EmailTokenStore: Send + Sync {
    async fn insert(
        &self,
        token_hash: &[u8],
        user_id: Uuid,
        purpose: TokenPurpose,
        expires_at_unix: i64,
    ) -> Result<(), StoreError>;

    /// Consume a live token exactly once, returning the owning user id.
    /// Expired, unknown, or already-consumed tokens yield `None`.
    async fn consume(
        &self,
        token_hash: &[u8],
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>, StoreError>;
}

/// Current wall clock as unix seconds. Sessions and email tokens use absolute
/// expiry, checked lazily at validation time.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}
