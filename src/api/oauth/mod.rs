//! OAuth 2.0 account linking for Instagram and TikTok.
//!
//! Implements the authorization code flow:
//! 1. Creator clicks "Connect" on the integration page
//! 2. GET /api/auth/:platform/login → Redirect to the platform
//! 3. Creator authorizes on the platform's site
//! 4. Platform redirects to /api/auth/:platform/callback
//! 5. Exchange code for token, fetch profile, store encrypted tokens
//! 6. Browser lands back on /integrations/:platform
//!
//! Both endpoints answer with `302` redirects only; failures travel as
//! `error` / `error_description` query parameters.

use crate::api::auth_middleware::authenticate;
use crate::api::{found, AppError, AppState};
use crate::link::{self, CallbackParams, LinkError, LinkStage};
use crate::models::Platform;
use axum::{
    extract::{rejection::QueryRejection, Form, Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::{debug, info, warn};


const INVALID_REQUEST: &str = "invalid_request";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/:platform/login", get(oauth_start))
        .route(
            "/api/auth/:platform/callback",
            get(oauth_callback).post(oauth_callback_form),
        )
}

fn parse_platform(raw: &str) -> Result<Platform, AppError> {
    raw.parse().map_err(|_| {
        warn!(platform = %raw, "Unknown platform");
        AppError::not_found(format!("Platform '{}' not found", raw))
    })
}

/// Integration page URL carrying an error code and optional description.
pub(crate) fn error_redirect_url(
    integration_url: &str,
    error: &str,
    description: Option<&str>,
) -> String {
    let mut params = vec![("error", error)];
    if let Some(description) = description {
        params.push(("error_description", description));
    }
    match serde_urlencoded::to_string(&params) {
        Ok(query) => format!("{}?{}", integration_url, query),
        Err(_) => integration_url.to_string(),
    }
}

/// Login page URL that returns to the integration page afterwards.
pub(crate) fn login_redirect_url(platform: Platform) -> String {
    format!("/login?callbackUrl={}", platform.integration_path())
}

/// GET /api/auth/:platform/login
///
/// Redirects an authenticated creator to the platform's consent screen.
///
/// # Security
/// - Requires a session (cookie or bearer)
/// - Caller must be linked to a creator record
/// - State is HMAC-signed over the creator and agency, with expiry
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform)?;
    debug!(platform = %platform, stage = LinkStage::Initiated.as_str(), "OAuth start requested");

    let Some(auth) = authenticate(&state, &headers)? else {
        return Ok(found(&login_redirect_url(platform)));
    };

    let integration_path = platform.integration_path();
    let Some(creator) = state.store.find_creator_by_user(&auth.user.id)? else {
        warn!(platform = %platform, user_id = %auth.user.id, "OAuth start without a creator record");
        let description = format!(
            "You must be set up as a creator to link {} accounts",
            link::display_name(platform)
        );
        return Ok(found(&error_redirect_url(
            &integration_path,
            "creator_required",
            Some(&description),
        )));
    };

    let signed_state = state.signer.sign(&creator.id, &creator.agency_id)?;
    let redirect_uri = state.config.callback_url(platform);
    let authorize_url = state
        .platforms
        .get(platform)
        .and_then(|client| client.authorize_url(&signed_state, &redirect_uri));

    let Some(authorize_url) = authorize_url else {
        warn!(platform = %platform, "OAuth client id not configured");
        let description = format!("{} App ID not configured", link::display_name(platform));
        return Ok(found(&error_redirect_url(
            &integration_path,
            "config",
            Some(&description),
        )));
    };

    info!(
        platform = %platform,
        creator_id = %creator.id,
        "Redirecting to OAuth provider"
    );
    Ok(found(&authorize_url))
}

/// POST /api/auth/:platform/callback
///
/// Same as the GET variant; form fields take precedence over the query.
async fn oauth_callback_form(
    state: State<Arc<AppState>>,
    path: Path<String>,
    query: Result<Query<CallbackParams>, QueryRejection>,
    form: Option<Form<CallbackParams>>,
) -> Result<Response, AppError> {
    let query = match (query, form) {
        (Ok(Query(query)), Some(Form(form))) => Ok(Query(CallbackParams {
            code: form.code.or(query.code),
            state: form.state.or(query.state),
            error: form.error.or(query.error),
            error_description: form.error_description.or(query.error_description),
        })),
        // A well-formed body stands on its own
        (Err(_), Some(Form(form))) => Ok(Query(form)),
        (query, None) => query,
    };
    oauth_callback(state, path, query).await
}

/// GET /api/auth/:platform/callback
///
/// Completes the link and sends the browser back to the integration page.
/// Unparseable parameters redirect with `invalid_request`.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let platform = parse_platform(&platform)?;
    let integration_url = state.config.integration_url(platform);

    let params = match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            info!(platform = %platform, error = %rejection.body_text(), "Malformed OAuth callback");
            return Ok(found(&error_redirect_url(
                &integration_url,
                INVALID_REQUEST,
                Some("Invalid callback parameters"),
            )));
        }
    };

    let result = match state.platforms.get(platform) {
        Some(client) => {
            let redirect_uri = state.config.callback_url(platform);
            link::complete_link(
                &state.store,
                &state.cipher,
                &state.signer,
                client.as_ref(),
                &redirect_uri,
                params,
            )
            .await
        }
        None => Err(LinkError::Config(platform)),
    };

    match result {
        Ok(_) => Ok(found(&integration_url)),
        Err(err) => {
            match &err {
                LinkError::Failed(source) => {
                    warn!(platform = %platform, error = ?source, code = err.code(), "Account link failed")
                }
                other => {
                    info!(platform = %platform, error = %other, code = other.code(), "Account link aborted")
                }
            }
            let description = err.description();
            Ok(found(&error_redirect_url(
                &integration_url,
                err.code(),
                description.as_deref(),
            )))
        }
    }
}
