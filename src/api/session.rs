//! Signup, credential login and logout.

use crate::api::auth_middleware::{removal_cookie, session_cookie, AuthSession};
use crate::api::{AppError, AppState};
use crate::auth::{
    generate_session_token, hash_password_blocking, verify_password_blocking, MIN_PASSWORD_LENGTH,
};
use crate::models::{Profile, User};
use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap},
    response::Json,
    routing::post,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Role given to self-registered users.
const SIGNUP_ROLE: &str = "agency_user";

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: User,
    /// Same value as the session cookie, for clients using bearer auth.
    pub session_token: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}

/// Trims and lower-cases an email address.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// POST /api/auth/signup
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let email = req.email.as_deref().map(normalize_email).unwrap_or_default();
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::bad_request("Email and password are required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if state.store.find_user_by_email(&email)?.is_some() {
        return Err(AppError::Conflict("Email already in use".to_string()));
    }

    let hash = hash_password_blocking(password).await?;
    let profile = Profile {
        name: req
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        ..Default::default()
    };
    let user = state
        .store
        .create_user(&email, Some(&hash), SIGNUP_ROLE, &profile)?;

    info!(user_id = %user.id, "User signed up");
    Ok(Json(UserResponse { user }))
}

/// POST /api/auth/login
///
/// Issues a server-side session and the matching HTTP-only cookie.
async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let email = req.email.as_deref().map(normalize_email).unwrap_or_default();
    let password = req.password.unwrap_or_default();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::Unauthorized);
    }

    let Some(user) = state.store.find_user_by_email(&email)? else {
        return Err(AppError::Unauthorized);
    };
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(AppError::Unauthorized);
    };
    if !verify_password_blocking(password, hash.to_string()).await? {
        return Err(AppError::Unauthorized);
    }

    let token = generate_session_token();
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    let session = state.store.create_session(&user.id, &token, user_agent)?;

    info!(user_id = %user.id, session_id = %session.id, "User logged in");

    let jar = jar.add(session_cookie(&state.config.session, token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            user,
            session_token: token,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<OkResponse>), AppError> {
    state
        .store
        .revoke_session(&auth.user.id, Some(&auth.session.id), None)?;
    info!(user_id = %auth.user.id, session_id = %auth.session.id, "User logged out");

    let jar = jar.remove(removal_cookie(&state.config.session));
    Ok((jar, Json(OkResponse { ok: true })))
}
