//! Content sync, metrics snapshots and per-account statistics.
//!
//! Refresh is synchronous and all-or-nothing from the caller's point of view:
//! a failed platform fetch aborts before anything is written. Snapshots are
//! append-only, so two refreshes of N items yield 2N snapshot rows and still
//! N videos.

use crate::credentials::TokenCipher;
use crate::models::{SocialAccount, SocialVideo, VideoMetrics};
use crate::platforms::{ContentItem, PlatformApi};
use crate::store::{NewMetricsSnapshot, NewSocialVideo, Store};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Videos listed in the "top" section of the stats.
const TOP_VIDEOS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// No usable access token (revoked, never linked, or undecryptable).
    #[error("account not connected")]
    NotConnected,

    #[error("platform request failed: {0}")]
    Upstream(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Result of one metrics refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub success: bool,
    /// Items fetched, each of which got one new snapshot.
    pub videos_updated: usize,
    /// Items seen for the first time.
    pub videos_created: usize,
}

/// A stored video with its most recent snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ContentEntry {
    #[serde(flatten)]
    pub video: SocialVideo,
    pub metrics: Option<VideoMetrics>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopVideo {
    pub id: String,
    pub title: Option<String>,
    pub thumbnail_url: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    pub total_videos: usize,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub total_shares: i64,
    pub total_saves: i64,
    pub avg_engagement_rate: f64,
    pub top_videos: Vec<TopVideo>,
}

/// Decrypts the account's access token.
///
/// A token that fails to decrypt is treated like a missing one: the account
/// has to be reconnected.
pub fn access_token(cipher: &TokenCipher, account: &SocialAccount) -> Result<String, AnalyticsError> {
    let stored = account
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AnalyticsError::NotConnected)?;
    cipher.decrypt(stored).map_err(|e| {
        warn!(account_id = %account.id, error = %e, "Stored access token cannot be decrypted");
        AnalyticsError::NotConnected
    })
}

async fn fetch_items(
    cipher: &TokenCipher,
    client: &dyn PlatformApi,
    account: &SocialAccount,
    limit: u32,
) -> Result<Vec<ContentItem>, AnalyticsError> {
    let token = access_token(cipher, account)?;
    let external_id = account
        .external_id
        .as_deref()
        .ok_or(AnalyticsError::NotConnected)?;

    client
        .fetch_recent_content(&token, external_id, limit)
        .await
        .map_err(|e| {
            warn!(
                platform = %account.platform,
                account_id = %account.id,
                error = %e,
                "Content fetch failed"
            );
            AnalyticsError::Upstream(e)
        })
}

fn new_video(account: &SocialAccount, item: &ContentItem) -> NewSocialVideo {
    NewSocialVideo {
        social_account_id: account.id.clone(),
        platform: account.platform,
        external_id: item.external_id.clone(),
        title: item.title.clone(),
        description: item.description.clone(),
        thumbnail_url: item.thumbnail_url.clone(),
        video_url: item.video_url.clone(),
        share_url: item.share_url.clone(),
        duration: item.duration,
        published_at: item.published_at,
    }
}

/// Inserts the items not stored yet. Returns the stored video per item, in
/// order, and how many were new.
fn ensure_videos(
    store: &Store,
    account: &SocialAccount,
    items: &[ContentItem],
) -> anyhow::Result<(Vec<SocialVideo>, usize)> {
    let mut videos = Vec::with_capacity(items.len());
    let mut created = 0;
    for item in items {
        let (video, is_new) = store.ensure_video(&new_video(account, item))?;
        if is_new {
            created += 1;
        }
        videos.push(video);
    }
    Ok((videos, created))
}

/// Fetches the latest `limit` items and stores the unknown ones.
///
/// Returns the number of newly stored videos.
pub async fn sync_content(
    store: &Store,
    cipher: &TokenCipher,
    client: &dyn PlatformApi,
    account: &SocialAccount,
    limit: u32,
) -> Result<usize, AnalyticsError> {
    let items = fetch_items(cipher, client, account, limit).await?;
    let (_, created) = ensure_videos(store, account, &items)?;
    debug!(account_id = %account.id, fetched = items.len(), created, "Content synced");
    Ok(created)
}

/// Pulls the latest `page_size` items and appends one snapshot per item, all
/// stamped with the same snapshot time.
pub async fn refresh_metrics(
    store: &Store,
    cipher: &TokenCipher,
    client: &dyn PlatformApi,
    account: &SocialAccount,
    page_size: u32,
) -> Result<RefreshSummary, AnalyticsError> {
    let items = fetch_items(cipher, client, account, page_size).await?;
    let (videos, created) = ensure_videos(store, account, &items)?;

    let snapshot_time = Utc::now();
    for (video, item) in videos.iter().zip(&items) {
        store.append_metrics(
            &video.id,
            &NewMetricsSnapshot {
                snapshot_time,
                views: item.counts.views,
                likes: item.counts.likes,
                comments: item.counts.comments,
                shares: item.counts.shares,
                saves: item.counts.saves,
                engagement_rate: item.counts.engagement_rate(),
            },
        )?;
    }

    info!(
        platform = %account.platform,
        account_id = %account.id,
        videos_updated = items.len(),
        videos_created = created,
        "Metrics refreshed"
    );

    Ok(RefreshSummary {
        success: true,
        videos_updated: items.len(),
        videos_created: created,
    })
}

/// A page of stored videos, newest first, each with its latest snapshot.
pub fn list_content(
    store: &Store,
    account_id: &str,
    limit: u32,
    offset: u32,
) -> anyhow::Result<Vec<ContentEntry>> {
    Ok(store
        .list_videos_with_latest_metrics(account_id, limit, offset)?
        .into_iter()
        .map(|(video, metrics)| ContentEntry { video, metrics })
        .collect())
}

/// Aggregates the latest snapshot of every stored video of the account.
pub fn account_stats(store: &Store, account: &SocialAccount) -> anyhow::Result<AccountStats> {
    let rows = store.all_videos_with_latest_metrics(&account.id, account.platform)?;
    Ok(compute_stats(rows))
}

fn compute_stats(rows: Vec<(SocialVideo, Option<VideoMetrics>)>) -> AccountStats {
    let mut stats = AccountStats {
        total_videos: rows.len(),
        ..Default::default()
    };

    for (_, metrics) in &rows {
        if let Some(m) = metrics {
            stats.total_views += m.views;
            stats.total_likes += m.likes;
            stats.total_comments += m.comments;
            stats.total_shares += m.shares;
            stats.total_saves += m.saves.unwrap_or(0);
        }
    }

    if stats.total_views > 0 {
        let interactions =
            stats.total_likes + stats.total_comments + stats.total_shares + stats.total_saves;
        let rate = interactions as f64 / stats.total_views as f64 * 100.0;
        stats.avg_engagement_rate = (rate * 100.0).round() / 100.0;
    }

    let mut ranked: Vec<_> = rows
        .into_iter()
        .map(|(video, metrics)| {
            let (views, likes, comments) = metrics
                .map(|m| (m.views, m.likes, m.comments))
                .unwrap_or((0, 0, 0));
            TopVideo {
                id: video.id,
                title: video.title,
                thumbnail_url: video.thumbnail_url,
                views,
                likes,
                comments,
            }
        })
        .collect();
    ranked.sort_by(|a, b| b.views.cmp(&a.views));
    ranked.truncate(TOP_VIDEOS);
    stats.top_videos = ranked;

    stats
}
