//! Local authentication API endpoints.
//!
//! - POST `/register` - Create an account and establish a session
//! - POST `/login` - Verify credentials and establish a session
//! - POST `/logout` - Destroy the session
//! - GET `/user` - Current user plus a freshly minted token

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, ResultExt};
use crate::auth::{
    SESSION_COOKIE_NAME, SessionAuth, clear_session_cookie, get_cookie, session_cookie,
};
use crate::db::{Database, generate_session_id, hash_session_id, is_unique_violation};
use crate::impl_has_session_backend;
use crate::jwt::JwtConfig;
use crate::password;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub session_secret: Arc<String>,
    pub secure_cookies: bool,
    pub rate_limit: Arc<RateLimitConfig>,
}

impl_has_session_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/user", get(current_user))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct PublicUser {
    id: i64,
    username: String,
}

/// Success shape shared by register, login, and the current-user endpoint.
#[derive(Serialize)]
struct AuthResponse {
    user: PublicUser,
    token: String,
}

/// Create a fresh session bound to a user, returning the Set-Cookie value.
/// A new session id is issued on every login; an existing anonymous
/// session is never upgraded in place.
async fn establish_session(state: &AuthState, user_id: i64) -> Result<String, ApiError> {
    let session_id = generate_session_id();
    let token_hash = hash_session_id(&state.session_secret, &session_id);

    state
        .db
        .sessions()
        .create(&token_hash, Some(user_id))
        .await
        .db_err("Failed to create session")?;

    Ok(session_cookie(&session_id, state.secure_cookies))
}

fn mint_token(state: &AuthState, user_id: i64, username: &str) -> Result<String, ApiError> {
    state.jwt.generate_token(user_id, username).map_err(|e| {
        error!(error = %e, "Failed to generate token");
        ApiError::internal("Internal server error")
    })
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let existing = state
        .db
        .users()
        .get_by_username(&payload.username)
        .await
        .db_err("Failed to check username")?;
    if existing.is_some() {
        return Err(ApiError::bad_request("Username already exists"));
    }

    let password_hash = password::hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::internal("Internal server error")
    })?;

    // The UNIQUE constraint settles concurrent registrations of one
    // username; the loser gets the same response as the pre-check.
    let user_id = match state
        .db
        .users()
        .create(&payload.username, &password_hash)
        .await
    {
        Ok(id) => id,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::bad_request("Username already exists"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    let token = mint_token(&state, user_id, &payload.username)?;
    let cookie = establish_session(&state, user_id).await?;

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: PublicUser {
                id: user_id,
                username: payload.username,
            },
            token,
        }),
    ))
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_username(&payload.username)
        .await
        .db_err("Failed to look up user")?;

    let Some(user) = user else {
        // Unknown user: burn a key derivation so this path costs the same
        // as a real verification.
        password::dummy_verify(&payload.password);
        return Err(ApiError::unauthorized("Invalid username or password"));
    };

    let valid = password::verify_password(&payload.password, &user.password).map_err(|e| {
        error!(user_id = user.id, error = %e, "Stored password hash is malformed");
        ApiError::internal("Internal server error")
    })?;
    if !valid {
        return Err(ApiError::unauthorized("Invalid username or password"));
    }

    let token = mint_token(&state, user.id, &user.username)?;
    let cookie = establish_session(&state, user.id).await?;

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: PublicUser {
                id: user.id,
                username: user.username,
            },
            token,
        }),
    ))
}

/// Destroy the session referenced by the cookie, if any, and clear the
/// cookie. Responds 200 either way.
async fn logout(
    State(state): State<AuthState>,
    request: axum::extract::Request,
) -> Result<impl IntoResponse, ApiError> {
    let (parts, _body) = request.into_parts();

    if let Some(session_id) = get_cookie(&parts.headers, SESSION_COOKIE_NAME) {
        let token_hash = hash_session_id(&state.session_secret, session_id);
        if let Err(e) = state.db.sessions().delete(&token_hash).await {
            error!(error = %e, "Failed to delete session");
        }
    }

    Ok((
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie(state.secure_cookies))],
    ))
}

/// Return the session's user with a freshly minted token. Tokens are cheap
/// and stateless, so one is issued on every call rather than cached.
async fn current_user(
    State(state): State<AuthState>,
    SessionAuth(user): SessionAuth,
) -> Result<impl IntoResponse, ApiError> {
    let token = mint_token(&state, user.user_id, &user.username)?;

    Ok(Json(AuthResponse {
        user: PublicUser {
            id: user.user_id,
            username: user.username,
        },
        token,
    }))
}
