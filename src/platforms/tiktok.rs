use super::oauth::{build_authorize_url, exchange_code_for_token};
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
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

pub const AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";
pub const TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";
pub const API_BASE: &str = "https://open.tiktokapis.com/v2";

const SCOPES: [&str; 2] = ["user.info.basic", "video.list"];

const USER_FIELDS: &str = "open_id,union_id,avatar_url,display_name,avatar_url_100";

const VIDEO_FIELDS: &str = "id,title,cover_image_url,share_url,video_description,duration,\
     create_time,like_count,comment_count,share_count,view_count";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Default, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    data: Option<UserInfoData>,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfoData {
    #[serde(default)]
    user: Option<TikTokUser>,
}

#[derive(Debug, Default, Deserialize)]
struct TikTokUser {
    #[serde(default)]
    open_id: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    avatar_url_100: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    data: Option<VideoListData>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoListData {
    #[serde(default)]
    videos: Vec<TikTokVideo>,
}

#[derive(Debug, Deserialize)]
struct TikTokVideo {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cover_image_url: Option<String>,
    #[serde(default)]
    share_url: Option<String>,
    #[serde(default)]
    video_description: Option<String>,
    #[serde(default)]
    duration: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    create_time: Option<i64>,
    #[serde(default)]
    like_count: Option<i64>,
    #[serde(default)]
    comment_count: Option<i64>,
    #[serde(default)]
    share_count: Option<i64>,
    #[serde(default)]
    view_count: Option<i64>,
}

impl TikTokVideo {
    fn into_item(self) -> ContentItem {
        ContentItem {
            external_id: self.id,
            title: self.title,
            description: self.video_description,
            thumbnail_url: self.cover_image_url,
            video_url: None,
            share_url: self.share_url,
            duration: self.duration,
            published_at: self
                .create_time
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            counts: EngagementCounts {
                views: self.view_count.unwrap_or(0),
                likes: self.like_count.unwrap_or(0),
                comments: self.comment_count.unwrap_or(0),
                shares: self.share_count.unwrap_or(0),
                saves: None,
            },
        }
    }
}

/// `@name` from a display name; whitespace runs become `_`.
fn handle_from_display_name(display_name: &str) -> String {
    if display_name.starts_with('@') {
        display_name.to_string()
    } else {
        format!("@{}", WHITESPACE.replace_all(display_name, "_"))
    }
}

/// TikTok Login Kit and Display API client.
pub struct TikTokClient {
    http_client: Client,
    /// Credentials only; endpoints are resolved into the fields below.
    credentials: PlatformConfig,
    authorize_url: String,
    token_url: String,
    api_base: String,
}

impl TikTokClient {
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

    /// Create a client whose token and API endpoints live under `base_url`
    /// (for testing with a mock server).
    pub fn with_base_url(client_key: &str, client_secret: &str, base_url: &str) -> Result<Self> {
        Self::new(&PlatformConfig {
            client_id: Some(client_key.to_string()),
            client_secret: Some(client_secret.to_string()),
            authorize_url: None,
            token_url: Some(format!("{}/oauth/token/", base_url)),
            api_base: Some(base_url.to_string()),
        })
    }
}

#[async_trait]
impl PlatformApi for TikTokClient {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    fn is_configured(&self) -> bool {
        self.credentials.credentials().is_some()
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Option<String> {
        let client_key = self.credentials.client_id()?;
        Some(build_authorize_url(
            &self.authorize_url,
            "client_key",
            client_key,
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
        let (client_key, client_secret) = self
            .credentials
            .credentials()
            .ok_or_else(|| anyhow!("TikTok credentials not configured"))?;
        exchange_code_for_token(
            &self.http_client,
            &self.token_url,
            &[("client_key", client_key), ("client_secret", client_secret)],
            code,
            redirect_uri,
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<RemoteProfile> {
        let url = format!("{}/user/info/", self.api_base);
        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", USER_FIELDS)])
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send TikTok user info request")?;

        check_response_status(&response)?;
        let body: UserInfoResponse = response
            .json()
            .await
            .context("Failed to parse TikTok user info response")?;
        let user = body.data.and_then(|d| d.user).unwrap_or_default();

        Ok(RemoteProfile {
            external_id: user.open_id.clone().filter(|s| !s.is_empty()),
            name: user.display_name.clone().filter(|s| !s.is_empty()),
            meta: serde_json::json!({
                "avatar_url": user.avatar_url,
                "avatar_url_100": user.avatar_url_100,
                "display_name": user.display_name,
            }),
        })
    }

    fn identify(&self, grant: &Credentials, profile: &RemoteProfile) -> Option<AccountIdentity> {
        let open_id = grant
            .user_id
            .clone()
            .or_else(|| profile.external_id.clone())?;
        let display_name = profile
            .name
            .clone()
            .unwrap_or_else(|| format!("TikTok {}", open_id));
        Some(AccountIdentity {
            handle: handle_from_display_name(&display_name),
            external_id: open_id,
        })
    }

    /// The account is identified by the token, so `external_id` is unused.
    async fn fetch_recent_content(
        &self,
        access_token: &str,
        _external_id: &str,
        limit: u32,
    ) -> Result<Vec<ContentItem>> {
        let url = format!("{}/video/list/", self.api_base);
        let max_count = limit.to_string();
        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", VIDEO_FIELDS), ("max_count", max_count.as_str())])
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send TikTok video list request")?;

        check_response_status(&response)?;
        let body: VideoListResponse = response
            .json()
            .await
            .context("Failed to parse TikTok video list response")?;

        Ok(body
            .data
            .map(|d| d.videos)
            .unwrap_or_default()
            .into_iter()
            .map(TikTokVideo::into_item)
            .collect())
    }
}

fn check_response_status(response: &reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("TikTok API error: {}", status))
    }
}
