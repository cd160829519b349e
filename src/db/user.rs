use sqlx::sqlite::SqlitePool;

use crate::password;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// A user record. Local accounts have a real password hash and null SSO
/// fields; SSO-created accounts have the unusable password sentinel and a
/// populated profile. A single record may satisfy both once linked.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// `hex(key).hex(salt)` stored form, or the unusable sentinel.
    pub password: String,
    /// Stable subject id assigned by the identity provider.
    pub scalekit_id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub token_expires_at: Option<i64>,
}

/// Provider tokens cached on a user. Written only as a unit, so the four
/// columns are never partially set after a successful exchange.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Absolute expiry in epoch seconds.
    pub expires_at: i64,
}

/// Input for creating a user from an SSO profile.
#[derive(Debug, Clone)]
pub struct NewScalekitUser {
    pub username: String,
    pub scalekit_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub tokens: ProviderTokens,
}

const USER_COLUMNS: &str = "id, username, password, scalekit_id, email, first_name, last_name, \
     access_token, refresh_token, id_token, token_expires_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a local user. Returns the assigned id. A taken username
    /// surfaces as a unique violation.
    pub async fn create(&self, username: &str, password_hash: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Create a user from an SSO profile. The password column gets the
    /// unusable sentinel so the record can never log in locally.
    pub async fn create_scalekit(&self, new: &NewScalekitUser) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (username, password, scalekit_id, email, first_name, last_name,
             access_token, refresh_token, id_token, token_expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.username)
        .bind(password::UNUSABLE_PASSWORD)
        .bind(&new.scalekit_id)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.tokens.access_token)
        .bind(&new.tokens.refresh_token)
        .bind(&new.tokens.id_token)
        .bind(new.tokens.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a user by username. Exact match, case sensitive.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a user by email.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a user by provider subject id.
    pub async fn get_by_scalekit_id(&self, scalekit_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE scalekit_id = ?",
            USER_COLUMNS
        ))
        .bind(scalekit_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Replace the four cached provider token fields on an existing user.
    /// Returns the updated record, or None when the id is unknown (the
    /// store is left unchanged).
    pub async fn update_tokens(
        &self,
        id: i64,
        tokens: &ProviderTokens,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "UPDATE users SET access_token = ?, refresh_token = ?, id_token = ?, token_expires_at = ?
             WHERE id = ? RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(&tokens.id_token)
        .bind(tokens.expires_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Link an existing (email-matched) user to a provider subject id,
    /// refreshing its cached tokens in the same update.
    pub async fn link_scalekit(
        &self,
        id: i64,
        scalekit_id: &str,
        tokens: &ProviderTokens,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as(&format!(
            "UPDATE users SET scalekit_id = ?, access_token = ?, refresh_token = ?, id_token = ?,
             token_expires_at = ? WHERE id = ? RETURNING {}",
            USER_COLUMNS
        ))
        .bind(scalekit_id)
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(&tokens.id_token)
        .bind(tokens.expires_at)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Whether a database error is a UNIQUE constraint violation. Used to map
/// create/link races on username, email, and scalekit_id to the duplicate
/// errors the pre-checks would have produced.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(e) if e.is_unique_violation())
}
