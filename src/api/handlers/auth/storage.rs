//! Database adapters: credential store and the session ledger.
//!
//! The ledger is a revocation record keyed by the SHA-256 of the session
//! identifier; raw identifiers never touch the database.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::is_unique_violation;
use super::verifier::{CredentialStore, UserRecord};

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created,
    Conflict,
}

/// Credential store backed by the `users` table.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let query = "SELECT id, username, password_hash, role FROM users WHERE username = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by username")?;

        Ok(row.map(|row| UserRecord {
            user_id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            admin: row.get::<String, _>("role") == "admin",
        }))
    }

    async fn record_login(&self, user_id: Uuid) -> Result<()> {
        let query = "UPDATE users SET last_login = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record last login")?;
        Ok(())
    }
}

pub(super) async fn insert_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = r"
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(SignupOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Record a promoted session in the ledger.
pub(super) async fn insert_session_record(
    pool: &PgPool,
    session_hash: &[u8],
    user_id: Uuid,
    fingerprint: &[u8],
    ttl_seconds: u64,
) -> Result<()> {
    let query = r"
        INSERT INTO sessions (session_hash, user_id, fingerprint, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_hash)
        .bind(user_id)
        .bind(fingerprint)
        .bind(i64::try_from(ttl_seconds).unwrap_or(i64::MAX))
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session record")?;
    Ok(())
}

/// Mark a session revoked. Deactivating an unknown hash is a no-op.
pub(super) async fn deactivate_session_record(pool: &PgPool, session_hash: &[u8]) -> Result<()> {
    let query = "UPDATE sessions SET is_active = FALSE WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to deactivate session record")?;
    Ok(())
}

/// Check whether a session is still valid according to the ledger.
/// Used for out-of-band revocation of sessions that are live in memory.
pub(super) async fn session_record_active(pool: &PgPool, session_hash: &[u8]) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM sessions
        WHERE session_hash = $1
          AND is_active
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check session record")?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::SignupOutcome;

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(format!("{:?}", SignupOutcome::Created), "Created");
        assert_eq!(format!("{:?}", SignupOutcome::Conflict), "Conflict");
    }
}
