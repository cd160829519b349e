//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::scalekit::ScalekitConfig;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

const DEFAULT_JWT_SECRET: &str = "supersecretkey";
const DEFAULT_SESSION_SECRET: &str = "sessionSecretKey";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Wicketgate",
    about = "Session-backed authentication with local accounts and Scalekit SSO"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "WICKETGATE_PORT", default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file. ":memory:" keeps everything in process
    #[arg(short, long, env = "WICKETGATE_DB", default_value = ":memory:")]
    pub database: String,

    /// Public base URL of the app. Drives cookie security and the SSO redirect URI
    #[arg(long, env = "APP_URL", default_value = "http://localhost:5000")]
    pub app_url: String,

    /// Secret for signing JWTs
    #[arg(long, env = "JWT_SECRET", default_value = DEFAULT_JWT_SECRET)]
    pub jwt_secret: String,

    /// Secret mixed into session ids before they are stored
    #[arg(long, env = "SESSION_SECRET", default_value = DEFAULT_SESSION_SECRET)]
    pub session_secret: String,

    /// Scalekit environment URL (e.g., "https://yourapp.scalekit.dev")
    #[arg(long, env = "SCALEKIT_ENVIRONMENT_URL", default_value = "")]
    pub scalekit_env_url: String,

    /// Scalekit client id
    #[arg(long, env = "SCALEKIT_CLIENT_ID", default_value = "")]
    pub scalekit_client_id: String,

    /// Scalekit client secret
    #[arg(long, env = "SCALEKIT_CLIENT_SECRET", default_value = "")]
    pub scalekit_client_secret: String,

    /// Log output format
    #[arg(short, long, env = "WICKETGATE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the app URL.
/// Returns None and logs an error if it is not an absolute http(s) URL.
pub fn validate_app_url(app_url: &str) -> Option<Url> {
    let url = match Url::parse(app_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %app_url, error = %e, "Invalid app URL");
            return None;
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        error!(url = %app_url, "App URL must use http or https");
        return None;
    }

    Some(url)
}

/// Warn when the built-in placeholder secrets are still in place.
pub fn warn_insecure_defaults(args: &Args) {
    if args.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("JWT_SECRET is the built-in default. Set a unique secret for production");
    }
    if args.session_secret == DEFAULT_SESSION_SECRET {
        warn!("SESSION_SECRET is the built-in default. Set a unique secret for production");
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, app_url: &Url) -> ServerConfig {
    let secure_cookies = app_url.scheme() == "https";

    let redirect_uri = format!("{}/api/auth/callback", args.app_url.trim_end_matches('/'));

    ServerConfig {
        db,
        jwt_secret: args.jwt_secret.clone().into_bytes(),
        session_secret: args.session_secret.clone(),
        secure_cookies,
        scalekit: ScalekitConfig {
            env_url: args.scalekit_env_url.clone(),
            client_id: args.scalekit_client_id.clone(),
            client_secret: args.scalekit_client_secret.clone(),
            redirect_uri,
        },
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_args() -> Args {
        Args::parse_from(["wicketgate"])
    }

    #[tokio::test]
    async fn test_build_config_derives_cookie_security_and_redirect() {
        let db = Database::open(":memory:").await.unwrap();

        let mut args = test_args();
        args.app_url = "https://sso.example.com/".to_string();
        let url = validate_app_url(&args.app_url).unwrap();

        let config = build_config(&args, db, &url);
        assert!(config.secure_cookies);
        assert_eq!(
            config.scalekit.redirect_uri,
            "https://sso.example.com/api/auth/callback"
        );
    }

    #[test]
    fn test_validate_app_url_rejects_garbage() {
        assert!(validate_app_url("not a url").is_none());
        assert!(validate_app_url("ftp://example.com").is_none());
        assert!(validate_app_url("http://localhost:5000").is_some());
    }
}
