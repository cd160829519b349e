#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use tower::ServiceExt;
use wicketgate::{ServerConfig, create_app, db::Database, scalekit::ScalekitConfig};

pub const TEST_JWT_SECRET: &[u8] = b"test-jwt-secret";
pub const TEST_SESSION_SECRET: &str = "test-session-secret";

/// Provider config pointing nowhere. SSO endpoints stay mounted but any
/// provider call fails with an upstream error.
pub fn unconfigured_scalekit() -> ScalekitConfig {
    ScalekitConfig {
        env_url: String::new(),
        client_id: String::new(),
        client_secret: String::new(),
        redirect_uri: "http://localhost:5000/api/auth/callback".to_string(),
    }
}

/// Server config over a fresh in-memory database.
pub async fn test_config(scalekit: ScalekitConfig) -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");

    ServerConfig {
        db,
        jwt_secret: TEST_JWT_SECRET.to_vec(),
        session_secret: TEST_SESSION_SECRET.to_string(),
        secure_cookies: false,
        scalekit,
    }
}

pub async fn create_test_app() -> Router {
    create_app(&test_config(unconfigured_scalekit()).await)
}

/// POST a JSON body and return the response.
pub async fn post_json(app: &Router, uri: &str, body: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// GET with an optional Cookie header.
pub async fn get_with_cookie(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// POST with an optional Cookie header and no body.
pub async fn post_with_cookie(app: &Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// First Set-Cookie value on a response.
pub fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// The "name=value" pair of a Set-Cookie value, for sending back.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Register a user, asserting success. Returns the session cookie pair and
/// the response body.
pub async fn register(app: &Router, username: &str, password: &str) -> (String, serde_json::Value) {
    let response = post_json(
        app,
        "/api/register",
        &format!(r#"{{"username": "{}", "password": "{}"}}"#, username, password),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = cookie_pair(&set_cookie(&response).expect("register sets a session cookie"));
    let json = body_json(response).await;
    (cookie, json)
}

/// Log a user in, asserting success. Returns the session cookie pair and
/// the response body.
pub async fn login(app: &Router, username: &str, password: &str) -> (String, serde_json::Value) {
    let response = post_json(
        app,
        "/api/login",
        &format!(r#"{{"username": "{}", "password": "{}"}}"#, username, password),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = cookie_pair(&set_cookie(&response).expect("login sets a session cookie"));
    let json = body_json(response).await;
    (cookie, json)
}
