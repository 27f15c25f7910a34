//! Page models for the dashboard UI.
//!
//! The service renders no HTML; these endpoints return the data a page needs.

use crate::api::auth_middleware::authenticate;
use crate::api::integrations::AccountSummary;
use crate::api::oauth::login_redirect_url;
use crate::api::{found, AppError, AppState, AuthSession};
use crate::models::{AccountStatus, Agency, Campaign, Creator, Platform, Profile};
use crate::store::Store;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub role: String,
    pub profile: Profile,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBadge {
    pub id: String,
    pub platform: Platform,
    pub handle: String,
    pub status: AccountStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorView {
    #[serde(flatten)]
    pub creator: Creator,
    pub social_accounts: Vec<AccountBadge>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyView {
    #[serde(flatten)]
    pub agency: Agency,
    pub creators: Vec<CreatorView>,
    pub campaigns: Vec<Campaign>,
    pub content_task_count: i64,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub user: UserSummary,
    pub creator: Option<Creator>,
    pub agencies: Vec<AgencyView>,
}

#[derive(Deserialize, Default)]
pub struct IntegrationPageQuery {
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationPage {
    pub platform: Platform,
    pub configured: bool,
    pub accounts: Vec<AccountSummary>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/integrations/:platform", get(integration_page))
}

fn agency_view(store: &Store, agency: Agency) -> anyhow::Result<AgencyView> {
    let creators = store
        .list_creators(&agency.id)?
        .into_iter()
        .map(|creator| -> anyhow::Result<CreatorView> {
            let social_accounts = store
                .list_creator_accounts(&creator.id)?
                .into_iter()
                .map(|a| AccountBadge {
                    id: a.id,
                    platform: a.platform,
                    handle: a.handle,
                    status: a.status,
                })
                .collect();
            Ok(CreatorView {
                creator,
                social_accounts,
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(AgencyView {
        campaigns: store.list_campaigns(&agency.id)?,
        content_task_count: store.count_content_tasks(&agency.id)?,
        creators,
        agency,
    })
}

/// GET /api/dashboard
async fn dashboard(
    State(state): State<Arc<AppState>>,
    auth: AuthSession,
) -> Result<Json<DashboardResponse>, AppError> {
    let creator = state.store.find_creator_by_user(&auth.user.id)?;
    let agencies = state
        .store
        .list_agencies_for_user(&auth.user.id)?
        .into_iter()
        .map(|agency| agency_view(&state.store, agency))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(DashboardResponse {
        user: UserSummary {
            id: auth.user.id,
            email: auth.user.email,
            role: auth.user.role,
            profile: auth.user.profile,
        },
        creator,
        agencies,
    }))
}

/// GET /integrations/:platform
///
/// Anonymous visitors are sent to the login page, which returns here.
async fn integration_page(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Query(query): Query<IntegrationPageQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let platform: Platform = platform
        .parse()
        .map_err(|_| AppError::not_found("Unknown platform"))?;

    let Some(auth) = authenticate(&state, &headers)? else {
        return Ok(found(&login_redirect_url(platform)));
    };

    let accounts = match state.store.find_creator_by_user(&auth.user.id)? {
        Some(creator) => state.store.list_active_accounts(&creator.id, platform)?,
        None => Vec::new(),
    };
    let configured = state
        .platforms
        .get(platform)
        .is_some_and(|client| client.is_configured());

    Ok(Json(IntegrationPage {
        platform,
        configured,
        accounts: accounts.into_iter().map(AccountSummary::from).collect(),
        error: query.error.filter(|e| !e.is_empty()),
        error_description: query.error_description.filter(|d| !d.is_empty()),
    })
    .into_response())
}
