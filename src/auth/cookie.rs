//! Cookie parsing and construction for session authentication.

use axum::http::header;

use crate::db::SESSION_DURATION_SECS;

/// Cookie name for the session id.
pub const SESSION_COOKIE_NAME: &str = "wg_session";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Build the Set-Cookie value establishing a session.
///
/// SameSite=Lax, not Strict: the SSO callback arrives as a cross-site
/// top-level navigation and must carry this cookie.
pub fn session_cookie(session_id: &str, secure_cookies: bool) -> String {
    let secure = if secure_cookies { "; Secure" } else { "" };
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        SESSION_COOKIE_NAME, session_id, SESSION_DURATION_SECS, secure
    )
}

/// Build the Set-Cookie value clearing the session cookie.
pub fn clear_session_cookie(secure_cookies: bool) -> String {
    let secure = if secure_cookies { "; Secure" } else { "" };
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}",
        SESSION_COOKIE_NAME, secure
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_get_cookie_simple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("wg_session=abc123"));

        assert_eq!(get_cookie(&headers, "wg_session"), Some("abc123"));
    }

    #[test]
    fn test_get_cookie_multiple() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("foo=bar; wg_session=abc123; theme=dark"),
        );

        assert_eq!(get_cookie(&headers, "wg_session"), Some("abc123"));
        assert_eq!(get_cookie(&headers, "theme"), Some("dark"));
        assert_eq!(get_cookie(&headers, "foo"), Some("bar"));
    }

    #[test]
    fn test_get_cookie_not_found() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("foo=bar"));

        assert_eq!(get_cookie(&headers, "wg_session"), None);
    }

    #[test]
    fn test_get_cookie_no_header() {
        let headers = axum::http::HeaderMap::new();
        assert_eq!(get_cookie(&headers, "wg_session"), None);
    }

    #[test]
    fn test_get_cookie_with_spaces() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("  wg_session = abc123  ; foo=bar"),
        );

        assert_eq!(get_cookie(&headers, "wg_session"), Some("abc123"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("sid123", false);
        assert!(cookie.starts_with("wg_session=sid123; "));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(!cookie.contains("Secure"));

        let cookie = session_cookie("sid123", true);
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn test_clear_session_cookie() {
        let cookie = clear_session_cookie(false);
        assert!(cookie.starts_with("wg_session=; "));
        assert!(cookie.contains("Max-Age=0"));
    }
}
