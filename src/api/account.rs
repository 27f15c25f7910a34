//! Account self-service: profile, password, sessions and deletion.

use crate::api::auth_middleware::{removal_cookie, AuthSession};
use crate::api::session::normalize_email;
use crate::api::{AppError, AppState};
use crate::auth::{hash_password_blocking, verify_password_blocking, MIN_PASSWORD_LENGTH};
use crate::models::Profile;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::{delete, get, patch},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Largest accepted avatar value (a data URL or link), in bytes.
pub const MAX_AVATAR_BYTES: usize = 512 * 1024;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub profile: Profile,
}

#[derive(Deserialize, Default)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_current: bool,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionQuery {
    pub id: Option<String>,
    pub session_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionResponse {
    pub ok: bool,
    pub revoked_current_session: bool,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/account/profile",
            get(get_profile).patch(update_profile),
        )
        .route("/api/account/password", patch(change_password))
        .route(
            "/api/account/sessions",
            get(list_sessions).delete(revoke_session),
        )
        .route("/api/account", delete(delete_account))
}

/// Applies a profile patch: absent fields stay, values are trimmed and an
/// empty value clears the field.
fn merge_profile(current: &Profile, patch: &UpdateProfileRequest) -> Profile {
    fn apply(current: &Option<String>, update: &Option<String>) -> Option<String> {
        match update {
            None => current.clone(),
            Some(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }

    Profile {
        name: apply(&current.name, &patch.name),
        avatar: apply(&current.avatar, &patch.avatar),
        bio: apply(&current.bio, &patch.bio),
    }
}

/// GET /api/account/profile
async fn get_profile(auth: AuthSession) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        id: auth.user.id,
        email: auth.user.email,
        profile: auth.user.profile,
    })
}

/// PATCH /api/account/profile
async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let email = match req.email.as_deref() {
        None => None,
        Some(raw) => {
            let email = normalize_email(raw);
            if !EMAIL_RE.is_match(&email) {
                return Err(AppError::bad_request("Invalid email address"));
            }
            if email != auth.user.email {
                if let Some(other) = state.store.find_user_by_email(&email)? {
                    if other.id != auth.user.id {
                        return Err(AppError::Conflict("Email already in use".to_string()));
                    }
                }
            }
            Some(email)
        }
    };

    let profile = merge_profile(&auth.user.profile, &req);
    if profile.avatar.as_ref().map_or(0, String::len) > MAX_AVATAR_BYTES {
        return Err(AppError::bad_request("Avatar is too large"));
    }

    let user = state
        .store
        .update_user_profile(&auth.user.id, email.as_deref(), &profile)?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    info!(user_id = %user.id, "Profile updated");
    Ok(Json(ProfileResponse {
        id: user.id,
        email: user.email,
        profile: user.profile,
    }))
}

/// PATCH /api/account/password
async fn change_password(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let current = req.current_password.unwrap_or_default();
    let new = req.new_password.unwrap_or_default();
    if current.is_empty() || new.is_empty() {
        return Err(AppError::bad_request(
            "Current and new password are required",
        ));
    }
    if new.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    let Some(hash) = auth.user.password_hash.as_deref() else {
        return Err(AppError::bad_request("Account has no password set"));
    };
    if !verify_password_blocking(current, hash.to_string()).await? {
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let new_hash = hash_password_blocking(new).await?;
    state.store.update_password_hash(&auth.user.id, &new_hash)?;

    info!(user_id = %auth.user.id, "Password changed");
    Ok(Json(OkResponse { ok: true }))
}

/// GET /api/account/sessions
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
) -> Result<Json<SessionsResponse>, AppError> {
    let sessions = state
        .store
        .list_active_sessions(&auth.user.id)?
        .into_iter()
        .map(|s| SessionInfo {
            is_current: s.id == auth.session.id,
            id: s.id,
            user_agent: s.user_agent,
            created_at: s.created_at,
        })
        .collect();

    Ok(Json(SessionsResponse { sessions }))
}

/// DELETE /api/account/sessions?id=|sessionToken=
async fn revoke_session(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    jar: CookieJar,
    Query(query): Query<RevokeSessionQuery>,
) -> Result<(CookieJar, Json<RevokeSessionResponse>), AppError> {
    let id = query.id.as_deref().filter(|s| !s.is_empty());
    let token = query.session_token.as_deref().filter(|s| !s.is_empty());
    if id.is_none() && token.is_none() {
        return Err(AppError::bad_request("Session id or token is required"));
    }

    let revoked = state
        .store
        .revoke_session(&auth.user.id, id, token)?
        .ok_or_else(|| AppError::not_found("Session not found"))?;

    let revoked_current_session = revoked.id == auth.session.id;
    info!(
        user_id = %auth.user.id,
        session_id = %revoked.id,
        current = revoked_current_session,
        "Session revoked"
    );

    let jar = if revoked_current_session {
        jar.remove(removal_cookie(&state.config.session))
    } else {
        jar
    };
    Ok((
        jar,
        Json(RevokeSessionResponse {
            ok: true,
            revoked_current_session,
        }),
    ))
}

/// DELETE /api/account
async fn delete_account(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<OkResponse>), AppError> {
    state.store.delete_user(&auth.user.id)?;
    info!(user_id = %auth.user.id, "Account deleted");

    let jar = jar.remove(removal_cookie(&state.config.session));
    Ok((jar, Json(OkResponse { ok: true })))
}
