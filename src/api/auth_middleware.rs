use crate::api::{AppError, AppState};
use crate::auth::{extract_session_token, TokenError};
use crate::config::SessionConfig;
use crate::models::{User, UserSession};
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;


/// An authenticated caller: the live session and the user behind it.
///
/// Used as an extractor on every endpoint that requires login; rejects with
/// `401` when the request carries no valid session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub session: UserSession,
    /// Raw token the request presented.
    pub token: String,
}

/// Resolve the session of a request
///
/// # Flow
/// 1. Take the token from the session cookie, else from `Authorization: Bearer`
/// 2. Look up a non-revoked session with that token
/// 3. Reject sessions older than the configured max age
/// 4. Load the user
///
/// Returns `Ok(None)` for any unauthenticated request; `Err` only for store
/// failures.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Option<AuthSession>, AppError> {
    let token = match extract_session_token(headers, &state.config.session.cookie_name) {
        Ok(token) => token,
        Err(TokenError::Missing) => return Ok(None),
        Err(e) => {
            debug!(error = %e, "Rejected session token");
            return Ok(None);
        }
    };

    let Some(session) = state.store.find_active_session(&token)? else {
        return Ok(None);
    };

    let max_age = Duration::days(state.config.session.max_age_days);
    if Utc::now() - session.created_at > max_age {
        debug!(session_id = %session.id, "Session expired");
        return Ok(None);
    }

    let Some(user) = state.store.get_user(&session.user_id)? else {
        return Ok(None);
    };

    Ok(Some(AuthSession {
        user,
        session,
        token,
    }))
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers)?.ok_or(AppError::Unauthorized)
    }
}

/// Session cookie carrying `token`.
pub fn session_cookie(config: &SessionConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.secure_cookie)
        .max_age(time::Duration::days(config.max_age_days))
        .build()
}

/// Cookie that, passed to `CookieJar::remove`, clears the session cookie.
pub fn removal_cookie(config: &SessionConfig) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), "")).path("/").build()
}
