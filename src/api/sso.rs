//! External SSO API endpoints (authorization-code flow via Scalekit).
//!
//! - GET `/scalekit` - Start a login attempt: store a CSRF state on the
//!   session and return the provider authorization URL
//! - GET `/callback` - Finish: check the state, exchange the code, fetch
//!   the profile, reconcile it against the user store, bind the session

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{
        HeaderMap, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::IntoResponse,
    routing::get,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, ResultExt};
use crate::auth::{SESSION_COOKIE_NAME, get_cookie, session_cookie};
use crate::db::{
    Database, NewScalekitUser, ProviderTokens, User, epoch_secs, generate_session_id,
    hash_session_id, is_unique_violation,
};
use crate::jwt::JwtConfig;
use crate::scalekit::{ScalekitClient, TokenResponse, UserProfile};

/// CSRF state length in bytes (32 hex chars on the wire).
const STATE_BYTES: usize = 16;

#[derive(Clone)]
pub struct SsoState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub scalekit: Arc<ScalekitClient>,
    pub session_secret: Arc<String>,
    pub secure_cookies: bool,
}

pub fn router(state: SsoState) -> Router {
    Router::new()
        .route("/scalekit", get(initiate))
        .route("/callback", get(callback))
        .with_state(state)
}

fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Serialize)]
struct InitiateResponse {
    url: String,
}

/// Start an SSO login attempt. Reuses the request's live session or starts
/// an anonymous one, stores a fresh CSRF state on it, and returns the
/// provider authorization URL for the browser to navigate to. No
/// server-side redirect happens here.
async fn initiate(
    State(state): State<SsoState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = match get_cookie(&headers, SESSION_COOKIE_NAME) {
        Some(sid) => {
            let hash = hash_session_id(&state.session_secret, sid);
            let live = state
                .db
                .sessions()
                .get_valid(&hash)
                .await
                .db_err("Failed to load session")?;
            match live {
                Some(_) => sid.to_string(),
                None => new_anonymous_session(&state).await?,
            }
        }
        None => new_anonymous_session(&state).await?,
    };

    let token_hash = hash_session_id(&state.session_secret, &session_id);
    let csrf_state = generate_state();
    state
        .db
        .sessions()
        .set_oauth_state(&token_hash, &csrf_state)
        .await
        .db_err("Failed to store state")?;

    let url = state
        .scalekit
        .authorization_url(&csrf_state)
        .provider_err("Failed to build authorization URL")?;

    Ok((
        [(SET_COOKIE, session_cookie(&session_id, state.secure_cookies))],
        Json(InitiateResponse { url }),
    ))
}

async fn new_anonymous_session(state: &SsoState) -> Result<String, ApiError> {
    let session_id = generate_session_id();
    let token_hash = hash_session_id(&state.session_secret, &session_id);
    state
        .db
        .sessions()
        .create(&token_hash, None)
        .await
        .db_err("Failed to create session")?;
    Ok(session_id)
}

#[derive(Deserialize)]
struct CallbackQuery {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

/// Finish an SSO login attempt.
///
/// The state comparison runs before the code is even looked at, and the
/// stored state is cleared whether or not the comparison succeeds.
async fn callback(
    State(state): State<SsoState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = get_cookie(&headers, SESSION_COOKIE_NAME)
        .ok_or_else(|| ApiError::bad_request("Invalid state parameter"))?;
    let token_hash = hash_session_id(&state.session_secret, session_id);

    state
        .db
        .sessions()
        .get_valid(&token_hash)
        .await
        .db_err("Failed to load session")?
        .ok_or_else(|| ApiError::bad_request("Invalid state parameter"))?;

    let presented = query.state.as_deref().unwrap_or_default();
    let matched = state
        .db
        .sessions()
        .consume_oauth_state(&token_hash, presented)
        .await
        .db_err("Failed to check state")?;
    if !matched {
        return Err(ApiError::bad_request("Invalid state parameter"));
    }

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        return Err(ApiError::bad_request("Authorization code missing"));
    };

    let tokens = state
        .scalekit
        .exchange_code(code)
        .await
        .provider_err("Failed to exchange authorization code")?;

    let profile = state
        .scalekit
        .fetch_userinfo(&tokens.access_token)
        .await
        .provider_err("Failed to fetch user profile")?;

    let user = reconcile(&state, &profile, &tokens).await?;

    state
        .db
        .sessions()
        .bind_user(&token_hash, user.id)
        .await
        .db_err("Failed to bind session")?;

    let token = state
        .jwt
        .generate_token(user.id, &user.username)
        .map_err(|e| {
            error!(error = %e, "Failed to generate token");
            ApiError::internal("Internal server error")
        })?;

    // The frontend picks the token out of the query string and drops it
    // from the URL.
    Ok((
        StatusCode::FOUND,
        [(LOCATION, format!("/?token={}", token))],
    ))
}

/// Match an SSO profile to a user record: by provider subject id first,
/// then by email (copying the subject id onto the matched record), else by
/// creating a new user from the profile.
async fn reconcile(
    state: &SsoState,
    profile: &UserProfile,
    response: &TokenResponse,
) -> Result<User, ApiError> {
    let tokens = ProviderTokens {
        access_token: response.access_token.clone(),
        refresh_token: response.refresh_token.clone(),
        id_token: response.id_token.clone(),
        expires_at: epoch_secs() + response.expires_in,
    };

    // Already linked: refresh the cached tokens and reuse the record.
    if let Some(user) = state
        .db
        .users()
        .get_by_scalekit_id(&profile.id)
        .await
        .db_err("Failed to look up user by subject id")?
    {
        return state
            .db
            .users()
            .update_tokens(user.id, &tokens)
            .await
            .db_err("Failed to update tokens")?
            .ok_or_else(|| {
                error!(user_id = user.id, "User vanished during token update");
                ApiError::internal("Internal server error")
            });
    }

    // The email matches a known account: link the subject id onto it.
    if let Some(email) = profile.email.as_deref() {
        if let Some(user) = state
            .db
            .users()
            .get_by_email(email)
            .await
            .db_err("Failed to look up user by email")?
        {
            return state
                .db
                .users()
                .link_scalekit(user.id, &profile.id, &tokens)
                .await
                .db_err("Failed to link user")?
                .ok_or_else(|| {
                    error!(user_id = user.id, "User vanished during linking");
                    ApiError::internal("Internal server error")
                });
        }
    }

    // Nobody matched: create a new record from the profile.
    let username = profile
        .username
        .clone()
        .or_else(|| profile.email.clone())
        .unwrap_or_else(|| format!("user_{}", profile.id));

    let new = NewScalekitUser {
        username,
        scalekit_id: profile.id.clone(),
        email: profile.email.clone(),
        first_name: profile.first_name.clone(),
        last_name: profile.last_name.clone(),
        tokens,
    };

    let user_id = match state.db.users().create_scalekit(&new).await {
        Ok(id) => id,
        // A concurrent callback or registration won the unique race.
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::bad_request("Account already exists"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    state
        .db
        .users()
        .get_by_id(user_id)
        .await
        .db_err("Failed to load new user")?
        .ok_or_else(|| ApiError::internal("Internal server error"))
}
