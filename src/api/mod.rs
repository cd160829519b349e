mod auth;
mod error;
mod health;
mod sso;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::scalekit::ScalekitClient;

/// Create the API router.
///
/// Local credential endpoints sit directly under the mount point; the SSO
/// flow is nested under `/auth`.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    scalekit: Arc<ScalekitClient>,
    session_secret: Arc<String>,
    secure_cookies: bool,
) -> Router {
    let rate_limit = Arc::new(RateLimitConfig::new());

    let auth_state = auth::AuthState {
        db: db.clone(),
        jwt: jwt.clone(),
        session_secret: session_secret.clone(),
        secure_cookies,
        rate_limit,
    };

    let sso_state = sso::SsoState {
        db,
        jwt,
        scalekit,
        session_secret,
        secure_cookies,
    };

    Router::new()
        .merge(auth::router(auth_state))
        .nest("/auth", sso::router(sso_state))
        .merge(health::router())
}
