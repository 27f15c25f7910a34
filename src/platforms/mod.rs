//! Outbound clients for the supported social platforms.
//!
//! Each platform implements [`PlatformApi`]: OAuth authorize URL, code
//! exchange, profile lookup and recent-content listing. Clients are stateless
//! apart from their HTTP client and configuration; tokens are passed in per
//! call and never stored here.
//!
//! # Link lifecycle
//! 1. `authorize_url()` builds the redirect to the platform consent page
//! 2. The platform calls back with a code
//! 3. `exchange_code()` trades it for [`Credentials`]
//! 4. `fetch_profile()` + `identify()` resolve the external id and handle
//! 5. `fetch_recent_content()` feeds the metrics refresh afterwards

mod instagram;
mod oauth;
mod tiktok;

pub use instagram::InstagramClient;
pub use tiktok::TikTokClient;

use crate::config::UrieConfig;
use crate::credentials::Credentials;
use crate::models::Platform;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Profile data returned by a platform's "who am I" endpoint.
#[derive(Clone, Debug, Default)]
pub struct RemoteProfile {
    /// Stable platform user id, when the profile reports one.
    pub external_id: Option<String>,
    /// Username or display name, unprefixed.
    pub name: Option<String>,
    /// Opaque metadata stored on the account (picture, counts, ...).
    pub meta: serde_json::Value,
}

/// External id and handle a linked account is stored under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountIdentity {
    pub external_id: String,
    pub handle: String,
}

/// Engagement counters of one content item at fetch time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngagementCounts {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    /// Not reported by every platform.
    pub saves: Option<i64>,
}

impl EngagementCounts {
    /// `(likes + comments + shares [+ saves]) / views * 100`, zero without views.
    pub fn engagement_rate(&self) -> f64 {
        if self.views <= 0 {
            return 0.0;
        }
        let interactions = self.likes + self.comments + self.shares + self.saves.unwrap_or(0);
        interactions as f64 / self.views as f64 * 100.0
    }
}

/// One published item from a platform listing.
#[derive(Clone, Debug, Default)]
pub struct ContentItem {
    pub external_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub share_url: Option<String>,
    pub duration: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
    pub counts: EngagementCounts,
}

/// Failure of an authorization-code exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The platform answered but did not issue a token.
    #[error("token exchange rejected ({status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("token exchange request failed: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Platform client interface.
///
/// Implementations must be `Send + Sync`; one instance serves every request.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    fn platform(&self) -> Platform;

    /// Whether client id and secret are both configured.
    fn is_configured(&self) -> bool;

    /// Authorization URL for the consent redirect, `None` when no client id
    /// is configured.
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Option<String>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credentials, ExchangeError>;

    /// Fetches the profile of the token's owner.
    async fn fetch_profile(&self, access_token: &str) -> Result<RemoteProfile>;

    /// Resolves the external id and handle from the exchange result and the
    /// profile. `None` when the platform gave no usable id.
    fn identify(&self, grant: &Credentials, profile: &RemoteProfile) -> Option<AccountIdentity>;

    /// Lists the most recent `limit` content items of an account.
    async fn fetch_recent_content(
        &self,
        access_token: &str,
        external_id: &str,
        limit: u32,
    ) -> Result<Vec<ContentItem>>;
}

/// Platform clients by platform.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    clients: HashMap<Platform, Arc<dyn PlatformApi>>,
}

impl PlatformRegistry {
    /// Builds production clients for every platform from configuration.
    pub fn from_config(config: &UrieConfig) -> Result<Self> {
        let mut registry = Self::default();
        registry.insert(Arc::new(InstagramClient::new(&config.instagram)?));
        registry.insert(Arc::new(TikTokClient::new(&config.tiktok)?));
        Ok(registry)
    }

    pub fn insert(&mut self, client: Arc<dyn PlatformApi>) {
        self.clients.insert(client.platform(), client);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformApi>> {
        self.clients.get(&platform).cloned()
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    use anyhow::Context;
    reqwest::Client::builder()
        .user_agent(concat!("urie/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
