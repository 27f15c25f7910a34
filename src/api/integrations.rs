//! Linked-account management and analytics endpoints, scoped per platform.
//!
//! Every account-scoped request goes through [`load_account`]: an account
//! that does not exist, belongs to another platform, or is not accessible to
//! the caller is reported as the same 404.

use crate::analytics::{self, AccountStats, AnalyticsError, ContentEntry, RefreshSummary};
use crate::api::{AppError, AppState, AuthSession};
use crate::models::{AccountStatus, Platform, SocialAccount, User};
use crate::platforms::PlatformApi;
use crate::store::Store;
use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub handle: String,
    pub external_id: Option<String>,
    pub status: AccountStatus,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<SocialAccount> for AccountSummary {
    fn from(account: SocialAccount) -> Self {
        Self {
            id: account.id,
            handle: account.handle,
            external_id: account.external_id,
            status: account.status,
            meta: account.meta,
            created_at: account.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountSummary>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideosQuery {
    pub account_id: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct VideosResponse {
    pub videos: Vec<ContentEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountQuery {
    pub account_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/integrations/:platform/accounts", get(list_accounts))
        .route(
            "/api/integrations/:platform/accounts/:id",
            delete(disconnect_account),
        )
        .route(
            "/api/integrations/:platform/analytics/videos",
            get(list_videos),
        )
        .route(
            "/api/integrations/:platform/analytics/refresh",
            post(refresh),
        )
        .route("/api/integrations/:platform/analytics/stats", get(stats))
}

fn parse_platform(raw: &str) -> Result<Platform, AppError> {
    raw.parse()
        .map_err(|_| AppError::not_found("Unknown platform"))
}

fn require_account_id(account_id: Option<String>) -> Result<String, AppError> {
    account_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("accountId is required"))
}

/// Whether `user` may act on `account`: they are the user behind its
/// creator, or a member (or owner) of its agency.
pub(crate) fn can_access_account(
    store: &Store,
    user: &User,
    account: &SocialAccount,
) -> anyhow::Result<bool> {
    if let Some(creator) = store.get_creator(&account.creator_id)? {
        if creator.user_id.as_deref() == Some(user.id.as_str()) {
            return Ok(true);
        }
    }
    store.is_agency_member(&account.agency_id, &user.id)
}

/// Loads an account of `platform` the caller may access.
fn load_account(
    state: &AppState,
    auth: &AuthSession,
    platform: Platform,
    account_id: &str,
) -> Result<SocialAccount, AppError> {
    let not_found = || AppError::not_found("Account not found");

    let account = state
        .store
        .get_social_account(account_id)?
        .ok_or_else(not_found)?;
    if account.platform != platform || !can_access_account(&state.store, &auth.user, &account)? {
        return Err(not_found());
    }
    Ok(account)
}

fn client_for(state: &AppState, platform: Platform) -> Result<Arc<dyn PlatformApi>, AppError> {
    state.platforms.get(platform).ok_or_else(|| {
        AppError::internal(
            "Platform client unavailable",
            anyhow::anyhow!("no client registered for {}", platform),
        )
    })
}

/// Maps an analytics failure to the endpoint's error, keeping the generic
/// message for anything that is not a missing connection.
fn analytics_error(message: &'static str, err: AnalyticsError) -> AppError {
    match err {
        AnalyticsError::NotConnected => AppError::bad_request("Account not connected"),
        AnalyticsError::Upstream(e) | AnalyticsError::Store(e) => AppError::internal(message, e),
    }
}

/// GET /api/integrations/:platform/accounts
async fn list_accounts(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(platform): Path<String>,
) -> Result<Json<AccountsResponse>, AppError> {
    let platform = parse_platform(&platform)?;
    let accounts = match state.store.find_creator_by_user(&auth.user.id)? {
        Some(creator) => state.store.list_active_accounts(&creator.id, platform)?,
        None => Vec::new(),
    };

    Ok(Json(AccountsResponse {
        accounts: accounts.into_iter().map(AccountSummary::from).collect(),
    }))
}

/// DELETE /api/integrations/:platform/accounts/:id
///
/// Soft delete: tokens are dropped, video and metrics history is kept.
async fn disconnect_account(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path((platform, account_id)): Path<(String, String)>,
) -> Result<Json<OkResponse>, AppError> {
    let platform = parse_platform(&platform)?;
    let account = load_account(&state, &auth, platform, &account_id)?;

    state.store.revoke_social_account(&account.id)?;
    info!(
        platform = %platform,
        account_id = %account.id,
        user_id = %auth.user.id,
        "Social account disconnected"
    );

    Ok(Json(OkResponse { ok: true }))
}

/// GET /api/integrations/:platform/analytics/videos?accountId&limit&offset
async fn list_videos(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(platform): Path<String>,
    Query(query): Query<VideosQuery>,
) -> Result<Json<VideosResponse>, AppError> {
    const FAILED: &str = "Failed to fetch videos";

    let platform = parse_platform(&platform)?;
    let account_id = require_account_id(query.account_id)?;
    let account = load_account(&state, &auth, platform, &account_id)?;

    let analytics_config = &state.config.analytics;
    let limit = query
        .limit
        .unwrap_or(analytics_config.refresh_page_size)
        .clamp(1, analytics_config.max_page_size.max(1));
    let offset = query.offset.unwrap_or(0);

    // Disconnected accounts serve stored history only
    if account.status == AccountStatus::Active {
        let client = client_for(&state, platform)?;
        analytics::sync_content(&state.store, &state.cipher, client.as_ref(), &account, limit)
            .await
            .map_err(|e| analytics_error(FAILED, e))?;
    }

    let videos = analytics::list_content(&state.store, &account.id, limit, offset)
        .map_err(|e| AppError::internal(FAILED, e))?;

    Ok(Json(VideosResponse { videos }))
}

/// POST /api/integrations/:platform/analytics/refresh
async fn refresh(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(platform): Path<String>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshSummary>, AppError> {
    let platform = parse_platform(&platform)?;
    let account_id = require_account_id(req.account_id)?;
    let account = load_account(&state, &auth, platform, &account_id)?;
    if account.status != AccountStatus::Active {
        return Err(AppError::bad_request("Account not connected"));
    }

    let client = client_for(&state, platform)?;
    let summary = analytics::refresh_metrics(
        &state.store,
        &state.cipher,
        client.as_ref(),
        &account,
        state.config.analytics.refresh_page_size,
    )
    .await
    .map_err(|e| analytics_error("Failed to refresh metrics", e))?;

    Ok(Json(summary))
}

/// GET /api/integrations/:platform/analytics/stats?accountId
async fn stats(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
    Path(platform): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<AccountStats>, AppError> {
    let platform = parse_platform(&platform)?;
    let account_id = require_account_id(query.account_id)?;
    let account = load_account(&state, &auth, platform, &account_id)?;

    let stats = analytics::account_stats(&state.store, &account)
        .map_err(|e| AppError::internal("Failed to compute stats", e))?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;
    use crate::config::UrieConfig;
    use crate::models::Profile;
    use crate::store::{NewCreator, Store};

    fn seed(store: &Store) -> (User, User, User, SocialAccount) {
        let owner = store
            .create_user("owner@urie.demo", None, "agency_user", &Profile::default())
            .unwrap();
        let creator_user = store
            .create_user("creator@urie.demo", None, "creator", &Profile::default())
            .unwrap();
        let stranger = store
            .create_user("stranger@urie.demo", None, "agency_user", &Profile::default())
            .unwrap();
        let agency = store
            .create_agency("Agency", "agency", &owner.id, serde_json::json!({}))
            .unwrap();
        let creator = store
            .create_creator(&NewCreator {
                agency_id: &agency.id,
                user_id: Some(&creator_user.id),
                display_name: "Creator",
                notes: None,
                tags: &[],
            })
            .unwrap();
        let account = store
            .insert_unlinked_account(
                &creator.id,
                &agency.id,
                Platform::TikTok,
                "@creator",
                serde_json::json!({}),
            )
            .unwrap();
        (owner, creator_user, stranger, account)
    }

    #[test]
    fn test_access_rule() {
        let state = test_state(UrieConfig::default());
        let (owner, creator_user, stranger, account) = seed(&state.store);

        assert!(can_access_account(&state.store, &owner, &account).unwrap());
        assert!(can_access_account(&state.store, &creator_user, &account).unwrap());
        assert!(!can_access_account(&state.store, &stranger, &account).unwrap());
    }

    #[test]
    fn test_analytics_error_mapping() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let not_connected = analytics_error("Failed to refresh metrics", AnalyticsError::NotConnected);
        assert_eq!(not_connected.into_response().status(), StatusCode::BAD_REQUEST);

        let upstream = analytics_error(
            "Failed to refresh metrics",
            AnalyticsError::Upstream(anyhow::anyhow!("502 from graph api")),
        );
        assert_eq!(
            upstream.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
