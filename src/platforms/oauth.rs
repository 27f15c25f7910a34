//! OAuth 2.0 authorization-code helpers shared by the platform clients.
//!
//! Builds authorize URLs and exchanges authorization codes for tokens.

use super::ExchangeError;
use crate::credentials::Credentials;
use anyhow::Context;
use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;

pub(crate) const DEFAULT_EXCHANGE_ERROR: &str = "Failed to exchange code for token";

/// Token endpoint response.
///
/// Covers the fields of both platforms; the error fields are only present on
/// rejected exchanges.
#[derive(Deserialize, Debug, Default)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Instagram returns a number here.
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    /// TikTok user identifier.
    #[serde(default)]
    open_id: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl TokenResponse {
    fn error_text(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.error_message.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_EXCHANGE_ERROR.to_string())
    }
}

/// Build the authorization URL a user is redirected to.
///
/// `client_param` is the name the platform uses for the client id
/// (`client_id` or `client_key`).
pub(crate) fn build_authorize_url(
    authorize_url: &str,
    client_param: &str,
    client_id: &str,
    scopes: &[&str],
    state: &str,
    redirect_uri: &str,
) -> String {
    let scopes = scopes.join(",");
    format!(
        "{}?{}={}&redirect_uri={}&response_type=code&scope={}&state={}",
        authorize_url,
        client_param,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes),
        urlencoding::encode(state)
    )
}

/// Exchange an authorization code for an access token.
///
/// `form` carries the platform-specific client fields; `grant_type`,
/// `redirect_uri` and `code` are added here. A non-2xx status or a body
/// without an access token is a rejection carrying the platform's error text.
pub(crate) async fn exchange_code_for_token(
    http_client: &Client,
    token_url: &str,
    form: &[(&str, &str)],
    code: &str,
    redirect_uri: &str,
) -> Result<Credentials, ExchangeError> {
    let mut form_data: Vec<(&str, &str)> = form.to_vec();
    form_data.push(("grant_type", "authorization_code"));
    form_data.push(("redirect_uri", redirect_uri));
    form_data.push(("code", code));

    tracing::debug!("Exchanging authorization code for token at {}", token_url);

    let response = http_client
        .post(token_url)
        .header("Accept", "application/json")
        .form(&form_data)
        .send()
        .await
        .context("Failed to send token exchange request")?;

    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read token exchange response")?;
    let token_response: TokenResponse = serde_json::from_str(&body).unwrap_or_default();

    if !status.is_success() {
        return Err(ExchangeError::Rejected {
            status: status.as_u16(),
            description: token_response.error_text(),
        });
    }

    let Some(access_token) = token_response.access_token.clone().filter(|t| !t.is_empty()) else {
        return Err(ExchangeError::Rejected {
            status: status.as_u16(),
            description: token_response.error_text(),
        });
    };

    tracing::debug!(
        "Token exchange successful, has_refresh_token={}, expires_in={:?}",
        token_response.refresh_token.is_some(),
        token_response.expires_in
    );

    let expires_at = token_response
        .expires_in
        .and_then(Duration::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl));

    let user_id = token_response
        .open_id
        .clone()
        .filter(|s| !s.is_empty())
        .or_else(|| token_response.user_id.as_ref().and_then(json_id));

    Ok(Credentials {
        access_token,
        refresh_token: token_response.refresh_token,
        expires_at,
        user_id,
    })
}

/// Reads an identifier that may arrive as a JSON string or number.
pub(crate) fn json_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
