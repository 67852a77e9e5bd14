//! Postgres-backed stores (sqlx).
//!
//! Every statement runs inside a `db.query` span and under a bounded timeout;
//! an elapsed timeout or a lost connection surfaces as
//! `StoreError::Unavailable`, never as a missing record.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    CreateUserOutcome, NewUser, SessionRecord, StoreError, TokenPurpose, UserRecord, UserStore,
};
use super::{EmailTokenStore, SessionStore};

const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect a pool sized for a small request-driven service.
///
/// # Errors
/// Returns an error if the database is unreachable.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(QUERY_TIMEOUT)
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn query_error(err: sqlx::Error, what: &str) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Unavailable(anyhow::Error::new(err).context(format!("{what}: connection lost")))
        }
        _ => StoreError::Query(anyhow::Error::new(err).context(format!("{what} failed"))),
    }
}

fn timed_out(what: &str) -> StoreError {
    StoreError::Unavailable(anyhow!("{what}: query timed out"))
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        use sqlx::Connection;

        let span = query_span("PING", "SELECT 1");
        let future = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        }
        .instrument(span);

        tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("ping database"))?
            .map_err(|err| query_error(err, "ping database"))?;
        Ok(())
    }

    async fn create(&self, user: NewUser) -> Result<CreateUserOutcome, StoreError> {
        let query = r"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING id, extract(epoch FROM created_at)::bigint AS created_at_unix
        ";
        let span = query_span("INSERT", query);
        let future = sqlx::query(query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .instrument(span);

        let row = match tokio::time::timeout(QUERY_TIMEOUT, future).await {
            Err(_) => return Err(timed_out("insert user")),
            Ok(Err(err)) if is_unique_violation(&err) => {
                return Ok(CreateUserOutcome::DuplicateEmail);
            }
            Ok(Err(err)) => return Err(query_error(err, "insert user")),
            Ok(Ok(row)) => row,
        };

        Ok(CreateUserOutcome::Created(UserRecord {
            id: row.get("id"),
            email: user.email,
            password_hash: user.password_hash,
            email_verified: false,
            created_at_unix: row.get("created_at_unix"),
        }))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = r"
            SELECT id, email, password_hash, email_verified,
                   extract(epoch FROM created_at)::bigint AS created_at_unix
            FROM users
            WHERE email = $1
        ";
        let span = query_span("SELECT", query);
        let future = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span);

        let row = tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("lookup user by email"))?
            .map_err(|err| query_error(err, "lookup user by email"))?;

        Ok(row.map(user_from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let query = r"
            SELECT id, email, password_hash, email_verified,
                   extract(epoch FROM created_at)::bigint AS created_at_unix
            FROM users
            WHERE id = $1
        ";
        let span = query_span("SELECT", query);
        let future = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span);

        let row = tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("lookup user by id"))?
            .map_err(|err| query_error(err, "lookup user by id"))?;

        Ok(row.map(user_from_row))
    }

    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let query = r"
            UPDATE users
            SET email_verified = TRUE,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = query_span("UPDATE", query);
        let future = sqlx::query(query).bind(id).execute(&self.pool).instrument(span);

        tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("mark email verified"))?
            .map_err(|err| query_error(err, "mark email verified"))?;
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let query = r"
            UPDATE users
            SET password_hash = $2,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = query_span("UPDATE", query);
        let future = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span);

        tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("update password hash"))?
            .map_err(|err| query_error(err, "update password hash"))?;
        Ok(())
    }
}

fn user_from_row(row: sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        email_verified: row.get("email_verified"),
        created_at_unix: row.get("created_at_unix"),
    }
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, session: SessionRecord) -> Result<bool, StoreError> {
        let query = r"
            INSERT INTO user_sessions (session_hash, user_id, created_at, expires_at, revoked)
            VALUES ($1, $2, to_timestamp($3::double precision), to_timestamp($4::double precision), FALSE)
        ";
        let span = query_span("INSERT", query);
        let future = sqlx::query(query)
            .bind(&session.token_hash)
            .bind(session.user_id)
            .bind(session.created_at_unix)
            .bind(session.expires_at_unix)
            .execute(&self.pool)
            .instrument(span);

        match tokio::time::timeout(QUERY_TIMEOUT, future).await {
            Err(_) => Err(timed_out("insert session")),
            Ok(Err(err)) if is_unique_violation(&err) => Ok(false),
            Ok(Err(err)) => Err(query_error(err, "insert session")),
            Ok(Ok(_)) => Ok(true),
        }
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<SessionRecord>, StoreError> {
        let query = r"
            SELECT user_id,
                   extract(epoch FROM created_at)::bigint AS created_at_unix,
                   extract(epoch FROM expires_at)::bigint AS expires_at_unix,
                   revoked
            FROM user_sessions
            WHERE session_hash = $1
        ";
        let span = query_span("SELECT", query);
        let future = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span);

        let row = tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("lookup session"))?
            .map_err(|err| query_error(err, "lookup session"))?;

        Ok(row.map(|row| SessionRecord {
            token_hash: token_hash.to_vec(),
            user_id: row.get("user_id"),
            created_at_unix: row.get("created_at_unix"),
            expires_at_unix: row.get("expires_at_unix"),
            revoked: row.get("revoked"),
        }))
    }

    async fn set_revoked(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        // Idempotent: zero affected rows is a success.
        let query = r"
            UPDATE user_sessions
            SET revoked = TRUE
            WHERE session_hash = $1
        ";
        let span = query_span("UPDATE", query);
        let future = sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(span);

        tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("revoke session"))?
            .map_err(|err| query_error(err, "revoke session"))?;
        Ok(())
    }

    async fn touch(&self, token_hash: &[u8], expires_at_unix: i64) -> Result<(), StoreError> {
        // GREATEST keeps the extension monotone under concurrent touches,
        // and revoked sessions are never extended.
        let query = r"
            UPDATE user_sessions
            SET expires_at = GREATEST(expires_at, to_timestamp($2::double precision))
            WHERE session_hash = $1
              AND revoked = FALSE
        ";
        let span = query_span("UPDATE", query);
        let future = sqlx::query(query)
            .bind(token_hash)
            .bind(expires_at_unix)
            .execute(&self.pool)
            .instrument(span);

        tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("extend session"))?
            .map_err(|err| query_error(err, "extend session"))?;
        Ok(())
    }
}

pub struct PgEmailTokenStore {
    pool: PgPool,
}

impl PgEmailTokenStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailTokenStore for PgEmailTokenStore {
    async fn insert(
        &self,
        token_hash: &[u8],
        user_id: Uuid,
        purpose: TokenPurpose,
        expires_at_unix: i64,
    ) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO email_tokens (token_hash, user_id, purpose, expires_at)
            VALUES ($1, $2, $3, to_timestamp($4::double precision))
        ";
        let span = query_span("INSERT", query);
        let future = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(purpose.as_str())
            .bind(expires_at_unix)
            .execute(&self.pool)
            .instrument(span);

        tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("insert email token"))?
            .map_err(|err| query_error(err, "insert email token"))?;
        Ok(())
    }

    async fn consume(
        &self,
        token_hash: &[u8],
        purpose: TokenPurpose,
    ) -> Result<Option<Uuid>, StoreError> {
        // Single conditional update makes consumption single-use even under
        // concurrent requests with the same token.
        let query = r"
            UPDATE email_tokens
            SET consumed_at = NOW()
            WHERE token_hash = $1
              AND purpose = $2
              AND consumed_at IS NULL
              AND expires_at > NOW()
            RETURNING user_id
        ";
        let span = query_span("UPDATE", query);
        let future = sqlx::query(query)
            .bind(token_hash)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .instrument(span);

        let row = tokio::time::timeout(QUERY_TIMEOUT, future)
            .await
            .map_err(|_| timed_out("consume email token"))?
            .map_err(|err| query_error(err, "consume email token"))?;

        Ok(row.map(|row| row.get("user_id")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn pool_timeout_maps_to_unavailable() {
        let err = query_error(sqlx::Error::PoolTimedOut, "lookup session");
        assert!(err.is_unavailable());

        let err = query_error(sqlx::Error::RowNotFound, "lookup session");
        assert!(!err.is_unavailable());
    }
}
