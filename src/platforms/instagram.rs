use super::oauth::{build_authorize_url, exchange_code_for_token, json_id};
use super::{
    http_client, AccountIdentity, ContentItem, EngagementCounts, ExchangeError, PlatformApi,
    RemoteProfile,
};
use crate::config::PlatformConfig;
use crate::credentials::Credentials;
use crate::models::Platform;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

pub const AUTHORIZE_URL: &str = "https://www.instagram.com/oauth/authorize";
pub const TOKEN_URL: &str = "https://api.instagram.com/oauth/access_token";
pub const API_BASE: &str = "https://graph.instagram.com";

const SCOPES: [&str; 4] = [
    "instagram_business_basic",
    "instagram_business_manage_messages",
    "instagram_business_manage_comments",
    "instagram_business_content_publish",
];

const PROFILE_FIELDS: &str =
    "id,user_id,username,account_type,profile_picture_url,followers_count,media_count";

const MEDIA_FIELDS: &str = "id,caption,media_type,media_url,thumbnail_url,permalink,timestamp,\
     like_count,comments_count,save_count,share_count,reach_count,impression_count";

/// Titles are the caption cut to this many characters.
const TITLE_CHARS: usize = 150;

#[derive(Debug, Deserialize)]
struct InstagramProfile {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    user_id: Option<serde_json::Value>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    account_type: Option<String>,
    #[serde(default)]
    profile_picture_url: Option<String>,
    #[serde(default)]
    followers_count: Option<i64>,
    #[serde(default)]
    media_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<InstagramMedia>,
}

#[derive(Debug, Deserialize)]
struct InstagramMedia {
    id: String,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    like_count: Option<i64>,
    #[serde(default)]
    comments_count: Option<i64>,
    #[serde(default)]
    save_count: Option<i64>,
    #[serde(default)]
    share_count: Option<i64>,
    #[serde(default)]
    reach_count: Option<i64>,
    #[serde(default)]
    impression_count: Option<i64>,
}

impl InstagramMedia {
    fn into_item(self) -> ContentItem {
        let views = self.impression_count.or(self.reach_count).unwrap_or(0);
        let title = self
            .caption
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| c.chars().take(TITLE_CHARS).collect());
        let is_video = self.media_type.as_deref() == Some("VIDEO");

        ContentItem {
            external_id: self.id,
            title,
            thumbnail_url: self.thumbnail_url.or_else(|| self.media_url.clone()),
            video_url: if is_video { self.media_url } else { None },
            share_url: self.permalink,
            duration: None,
            published_at: self.timestamp.as_deref().and_then(parse_timestamp),
            description: self.caption,
            counts: EngagementCounts {
                views,
                likes: self.like_count.unwrap_or(0),
                comments: self.comments_count.unwrap_or(0),
                shares: self.share_count.unwrap_or(0),
                saves: Some(self.save_count.unwrap_or(0)),
            },
        }
    }
}

/// Graph API timestamps look like `2024-05-01T12:00:00+0000`.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Instagram Business Login and Graph API client.
pub struct InstagramClient {
    http_client: Client,
    /// Credentials only; endpoints are resolved into the fields below.
    credentials: PlatformConfig,
    authorize_url: String,
    token_url: String,
    api_base: String,
}

impl InstagramClient {
    /// Create a client from configuration, using production endpoints for
    /// anything not overridden.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client()?,
            credentials: PlatformConfig {
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                ..Default::default()
            },
            authorize_url: config
                .authorize_url
                .clone()
                .unwrap_or_else(|| AUTHORIZE_URL.to_string()),
            token_url: config.token_url.clone().unwrap_or_else(|| TOKEN_URL.to_string()),
            api_base: config.api_base.clone().unwrap_or_else(|| API_BASE.to_string()),
        })
    }

    /// Create a client whose token and Graph endpoints live under `base_url`
    /// (for testing with a mock server).
    pub fn with_base_url(client_id: &str, client_secret: &str, base_url: &str) -> Result<Self> {
        Self::new(&PlatformConfig {
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            authorize_url: None,
            token_url: Some(format!("{}/oauth/access_token", base_url)),
            api_base: Some(base_url.to_string()),
        })
    }
}

#[async_trait]
impl PlatformApi for InstagramClient {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn is_configured(&self) -> bool {
        self.credentials.credentials().is_some()
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Option<String> {
        let client_id = self.credentials.client_id()?;
        Some(build_authorize_url(
            &self.authorize_url,
            "client_id",
            client_id,
            &SCOPES,
            state,
            redirect_uri,
        ))
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credentials, ExchangeError> {
        let (client_id, client_secret) = self
            .credentials
            .credentials()
            .ok_or_else(|| anyhow!("Instagram credentials not configured"))?;
        exchange_code_for_token(
            &self.http_client,
            &self.token_url,
            &[("client_id", client_id), ("client_secret", client_secret)],
            code,
            redirect_uri,
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<RemoteProfile> {
        let url = format!("{}/me", self.api_base);
        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", PROFILE_FIELDS), ("access_token", access_token)])
            .send()
            .await
            .context("Failed to send Instagram profile request")?;

        check_response_status(&response)?;
        let profile: InstagramProfile = response
            .json()
            .await
            .context("Failed to parse Instagram profile response")?;

        let external_id = profile
            .id
            .as_ref()
            .and_then(json_id)
            .or_else(|| profile.user_id.as_ref().and_then(json_id));

        Ok(RemoteProfile {
            external_id,
            name: profile.username.clone(),
            meta: serde_json::json!({
                "username": profile.username,
                "account_type": profile.account_type,
                "profile_picture_url": profile.profile_picture_url,
                "followers_count": profile.followers_count,
                "media_count": profile.media_count,
            }),
        })
    }

    fn identify(&self, grant: &Credentials, profile: &RemoteProfile) -> Option<AccountIdentity> {
        let external_id = profile
            .external_id
            .clone()
            .or_else(|| grant.user_id.clone())?;
        let handle = match profile.name.as_deref().filter(|n| !n.is_empty()) {
            Some(username) => format!("@{}", username),
            None => format!("@instagram_{}", external_id),
        };
        Some(AccountIdentity {
            external_id,
            handle,
        })
    }

    async fn fetch_recent_content(
        &self,
        access_token: &str,
        external_id: &str,
        limit: u32,
    ) -> Result<Vec<ContentItem>> {
        let url = format!("{}/{}/media", self.api_base, external_id);
        let limit = limit.to_string();
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("access_token", access_token),
                ("fields", MEDIA_FIELDS),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .context("Failed to send Instagram media request")?;

        check_response_status(&response)?;
        let page: MediaPage = response
            .json()
            .await
            .context("Failed to parse Instagram media response")?;

        Ok(page.data.into_iter().map(InstagramMedia::into_item).collect())
    }
}

fn check_response_status(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("Instagram API error: {}", status))
    }
}
