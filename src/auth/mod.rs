use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;

mod password;


pub use password::{
    generate_session_token, hash_password, hash_password_blocking, verify_password,
    verify_password_blocking, MIN_PASSWORD_LENGTH,
};

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    // Get Authorization header
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Extract the session token of a request
///
/// The session cookie wins over an `Authorization: Bearer` header, so browser
/// requests never depend on headers a proxy may strip.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Result<String, TokenError> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        let token = cookie.value().trim();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        return Ok(token.to_string());
    }

    extract_bearer_token(headers)
}

/// Parse bearer token from Authorization header value
///
/// Internal helper for extract_bearer_token
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    // Expect "Bearer <token>"
    let Some((scheme, token)) = header_value.split_once(' ') else {
        return Err(TokenError::InvalidFormat);
    };

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Neither a session cookie nor an Authorization header is present
    Missing,
    /// Invalid format (not "Bearer <token>")
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Session token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Session token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
