mod session;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use session::{
    SESSION_DURATION_SECS, Session, SessionStore, generate_session_id, hash_session_id,
};
pub use user::{NewScalekitUser, ProviderTokens, User, UserStore, is_unique_violation};

pub(crate) use session::epoch_secs;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // Keep one connection alive so an in-memory database survives
        // idle periods; the pool reaper would otherwise drop it.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Users table. Uniqueness of username, email, and
                // scalekit_id is enforced here, not by caller-side checks.
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password TEXT NOT NULL,
                    scalekit_id TEXT UNIQUE,
                    email TEXT UNIQUE,
                    first_name TEXT,
                    last_name TEXT,
                    access_token TEXT,
                    refresh_token TEXT,
                    id_token TEXT,
                    token_expires_at INTEGER
                )",
                // Sessions table, keyed by the hashed cookie value.
                // user_id is null for anonymous sessions.
                "CREATE TABLE sessions (
                    token_hash TEXT PRIMARY KEY,
                    user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                    oauth_state TEXT,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the session store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password;

    fn tokens(tag: &str) -> ProviderTokens {
        ProviderTokens {
            access_token: format!("access-{}", tag),
            refresh_token: Some(format!("refresh-{}", tag)),
            id_token: Some(format!("id-{}", tag)),
            expires_at: epoch_secs() + 1799,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.users().create("alice", "hash.salt").await.unwrap();

        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice");
        assert_eq!(user.password, "hash.salt");
        assert!(user.scalekit_id.is_none());
        assert!(user.email.is_none());
        assert!(user.access_token.is_none());

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn test_username_lookup_is_case_sensitive() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create("alice", "hash.salt").await.unwrap();

        assert!(db.users().get_by_username("Alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let db = Database::open(":memory:").await.unwrap();

        let a = db.users().create("alice", "h.s").await.unwrap();
        let b = db.users().create("bob", "h.s").await.unwrap();
        assert_eq!(b, a + 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create("alice", "h.s").await.unwrap();
        let result = db.users().create("alice", "h2.s2").await;

        assert!(is_unique_violation(&result.unwrap_err()));

        // The first record is untouched
        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.password, "h.s");
    }

    #[tokio::test]
    async fn test_create_scalekit_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create_scalekit(&NewScalekitUser {
                username: "carol@example.com".to_string(),
                scalekit_id: "sk-subject-1".to_string(),
                email: Some("carol@example.com".to_string()),
                first_name: Some("Carol".to_string()),
                last_name: None,
                tokens: tokens("carol"),
            })
            .await
            .unwrap();

        let user = db
            .users()
            .get_by_scalekit_id("sk-subject-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "carol@example.com");
        assert!(password::is_unusable(&user.password));
        assert_eq!(user.email.as_deref(), Some("carol@example.com"));
        assert_eq!(user.first_name.as_deref(), Some("Carol"));
        assert!(user.last_name.is_none());
        assert_eq!(user.access_token.as_deref(), Some("access-carol"));

        let by_email = db
            .users()
            .get_by_email("carol@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_scalekit_id_fails() {
        let db = Database::open(":memory:").await.unwrap();

        let new = NewScalekitUser {
            username: "dave".to_string(),
            scalekit_id: "sk-dup".to_string(),
            email: None,
            first_name: None,
            last_name: None,
            tokens: tokens("dave"),
        };
        db.users().create_scalekit(&new).await.unwrap();

        let result = db
            .users()
            .create_scalekit(&NewScalekitUser {
                username: "other".to_string(),
                ..new
            })
            .await;
        assert!(is_unique_violation(&result.unwrap_err()));
    }

    #[tokio::test]
    async fn test_update_tokens() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.users().create("alice", "h.s").await.unwrap();

        let updated = db
            .users()
            .update_tokens(id, &tokens("new"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, id);
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.password, "h.s");
        assert_eq!(updated.access_token.as_deref(), Some("access-new"));
        assert_eq!(updated.refresh_token.as_deref(), Some("refresh-new"));
        assert_eq!(updated.id_token.as_deref(), Some("id-new"));
        assert!(updated.token_expires_at.is_some());
    }

    #[tokio::test]
    async fn test_update_tokens_unknown_id() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create("alice", "h.s").await.unwrap();

        let result = db.users().update_tokens(9999, &tokens("x")).await.unwrap();
        assert!(result.is_none());

        // Nothing was written anywhere
        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert!(user.access_token.is_none());
    }

    #[tokio::test]
    async fn test_link_scalekit() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.users().create("erin", "h.s").await.unwrap();
        // Simulate a local account that registered an email out of band
        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind("erin@example.com")
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        let linked = db
            .users()
            .link_scalekit(id, "sk-erin", &tokens("erin"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(linked.id, id);
        assert_eq!(linked.username, "erin");
        assert_eq!(linked.password, "h.s");
        assert_eq!(linked.scalekit_id.as_deref(), Some("sk-erin"));
        assert_eq!(linked.access_token.as_deref(), Some("access-erin"));
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let db = Database::open(":memory:").await.unwrap();

        let hash = hash_session_id("secret", &generate_session_id());
        db.sessions().create(&hash, None).await.unwrap();

        let session = db.sessions().get_valid(&hash).await.unwrap().unwrap();
        assert!(session.user_id.is_none());
        assert!(session.oauth_state.is_none());
        assert!(session.expires_at > session.created_at);

        let id = db.users().create("alice", "h.s").await.unwrap();
        assert!(db.sessions().bind_user(&hash, id).await.unwrap());

        let session = db.sessions().get_valid(&hash).await.unwrap().unwrap();
        assert_eq!(session.user_id, Some(id));

        assert!(db.sessions().delete(&hash).await.unwrap());
        assert!(db.sessions().get_valid(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let db = Database::open(":memory:").await.unwrap();

        let hash = hash_session_id("secret", &generate_session_id());
        db.sessions().create(&hash, None).await.unwrap();

        sqlx::query("UPDATE sessions SET expires_at = 1 WHERE token_hash = ?")
            .bind(&hash)
            .execute(db.pool())
            .await
            .unwrap();

        assert!(db.sessions().get_valid(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_oauth_state_single_use() {
        let db = Database::open(":memory:").await.unwrap();

        let hash = hash_session_id("secret", &generate_session_id());
        db.sessions().create(&hash, None).await.unwrap();
        assert!(db.sessions().set_oauth_state(&hash, "state-1").await.unwrap());

        assert!(db.sessions().consume_oauth_state(&hash, "state-1").await.unwrap());
        // Already consumed
        assert!(!db.sessions().consume_oauth_state(&hash, "state-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_mismatched_oauth_state_still_cleared() {
        let db = Database::open(":memory:").await.unwrap();

        let hash = hash_session_id("secret", &generate_session_id());
        db.sessions().create(&hash, None).await.unwrap();
        db.sessions().set_oauth_state(&hash, "state-1").await.unwrap();

        assert!(!db.sessions().consume_oauth_state(&hash, "wrong").await.unwrap());
        // The stored state did not survive the failed attempt
        assert!(!db.sessions().consume_oauth_state(&hash, "state-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let db = Database::open(":memory:").await.unwrap();

        let live = hash_session_id("secret", &generate_session_id());
        let stale = hash_session_id("secret", &generate_session_id());
        db.sessions().create(&live, None).await.unwrap();
        db.sessions().create(&stale, None).await.unwrap();

        sqlx::query("UPDATE sessions SET expires_at = 1 WHERE token_hash = ?")
            .bind(&stale)
            .execute(db.pool())
            .await
            .unwrap();

        let removed = db.sessions().delete_expired().await.unwrap();
        assert_eq!(removed, 1);
        assert!(db.sessions().get_valid(&live).await.unwrap().is_some());
    }
}
