//! Server-side session storage.
//!
//! The cookie holds a random session id; the table is keyed by a hash of
//! that id computed with the session secret, so the raw cookie value never
//! reaches the database. Rows may exist before a user is attached: the SSO
//! initiate step stores its CSRF state on an anonymous session.

use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

/// Session lifetime: 1 hour, matching the cookie Max-Age.
pub const SESSION_DURATION_SECS: i64 = 60 * 60;

/// Raw session id length in bytes (64 hex chars in the cookie).
const SESSION_ID_BYTES: usize = 32;

/// An active (or expired, if read raw) session row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub token_hash: String,
    /// Null until a login or SSO callback binds a user.
    pub user_id: Option<i64>,
    /// Single-use CSRF state for an in-flight SSO attempt.
    pub oauth_state: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Generate a fresh random session id for the cookie.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a session id into the storage key, keyed with the session secret.
pub fn hash_session_id(secret: &str, session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(session_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new session, anonymous or already bound to a user.
    pub async fn create(
        &self,
        token_hash: &str,
        user_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        let now = epoch_secs();
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(now)
        .bind(now + SESSION_DURATION_SECS)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a session by its hashed id. Expired rows are treated as absent.
    pub async fn get_valid(&self, token_hash: &str) -> Result<Option<Session>, sqlx::Error> {
        sqlx::query_as(
            "SELECT token_hash, user_id, oauth_state, created_at, expires_at
             FROM sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(token_hash)
        .bind(epoch_secs())
        .fetch_optional(&self.pool)
        .await
    }

    /// Attach a user to a session and renew its expiry.
    pub async fn bind_user(&self, token_hash: &str, user_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET user_id = ?, expires_at = ? WHERE token_hash = ?")
            .bind(user_id)
            .bind(epoch_secs() + SESSION_DURATION_SECS)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the CSRF state for an SSO attempt, replacing any previous one.
    pub async fn set_oauth_state(&self, token_hash: &str, state: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET oauth_state = ? WHERE token_hash = ?")
            .bind(state)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Compare the presented CSRF state with the stored one and clear it.
    ///
    /// The stored state is single use: it is cleared whether or not the
    /// presented value matches. Returns true only on a match.
    pub async fn consume_oauth_state(
        &self,
        token_hash: &str,
        presented: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET oauth_state = NULL WHERE token_hash = ? AND oauth_state = ?",
        )
        .bind(token_hash)
        .bind(presented)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        sqlx::query("UPDATE sessions SET oauth_state = NULL WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(false)
    }

    /// Delete a session (logout).
    pub async fn delete(&self, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all expired sessions. Returns the number removed.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(epoch_secs())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
