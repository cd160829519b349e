//! Axum extractors for session authentication.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use super::cookie::{SESSION_COOKIE_NAME, get_cookie};
use super::errors::AuthError;
use super::state::HasSessionBackend;
use crate::db::hash_session_id;

/// The user resolved from a request's session cookie.
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// Database user id
    pub user_id: i64,
    /// Username
    pub username: String,
}

/// Extractor for endpoints that require an authenticated session.
///
/// Rejects with 401 when the cookie is absent, the session is unknown or
/// expired, or the session has no user bound to it (anonymous SSO-initiate
/// sessions).
pub struct SessionAuth(pub SessionUser);

impl<S> FromRequestParts<S> for SessionAuth
where
    S: HasSessionBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session_id =
            get_cookie(&parts.headers, SESSION_COOKIE_NAME).ok_or(AuthError::Unauthorized)?;
        let token_hash = hash_session_id(state.session_secret(), session_id);

        let session = state
            .db()
            .sessions()
            .get_valid(&token_hash)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load session");
                AuthError::Internal
            })?
            .ok_or(AuthError::Unauthorized)?;

        let user_id = session.user_id.ok_or(AuthError::Unauthorized)?;

        let user = state
            .db()
            .users()
            .get_by_id(user_id)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load session user");
                AuthError::Internal
            })?
            .ok_or(AuthError::Unauthorized)?;

        Ok(SessionAuth(SessionUser {
            user_id: user.id,
            username: user.username,
        }))
    }
}
