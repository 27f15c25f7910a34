//! Published content and its append-only metric snapshots.

use super::{new_id, Store};
use crate::models::{Platform, SocialVideo, VideoMetrics};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const VIDEO_COLUMNS: &str = "v.id, v.social_account_id, v.platform, v.external_id, v.title, \
     v.description, v.thumbnail_url, v.video_url, v.share_url, v.duration, v.published_at, \
     v.created_at";

const METRICS_COLUMNS: &str = "m.id, m.social_video_id, m.snapshot_time, m.views, m.likes, \
     m.comments, m.shares, m.saves, m.engagement_rate";

/// Latest snapshot per video; joined as `m`.
const LATEST_METRICS_JOIN: &str = "LEFT JOIN social_video_metrics m ON m.id = (
        SELECT id FROM social_video_metrics
        WHERE social_video_id = v.id
        ORDER BY snapshot_time DESC, id DESC
        LIMIT 1
    )";

#[derive(Clone, Debug)]
pub struct NewSocialVideo {
    pub social_account_id: String,
    pub platform: Platform,
    pub external_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub share_url: Option<String>,
    pub duration: Option<i64>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct NewMetricsSnapshot {
    pub snapshot_time: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: Option<i64>,
    pub engagement_rate: f64,
}

fn map_video(row: &Row<'_>) -> rusqlite::Result<SocialVideo> {
    Ok(SocialVideo {
        id: row.get(0)?,
        social_account_id: row.get(1)?,
        platform: row.get(2)?,
        external_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        thumbnail_url: row.get(6)?,
        video_url: row.get(7)?,
        share_url: row.get(8)?,
        duration: row.get(9)?,
        published_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Maps metric columns starting at `offset`; `None` when the left join found nothing.
fn map_metrics_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Option<VideoMetrics>> {
    let id: Option<String> = row.get(offset)?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(VideoMetrics {
        id,
        social_video_id: row.get(offset + 1)?,
        snapshot_time: row.get(offset + 2)?,
        views: row.get(offset + 3)?,
        likes: row.get(offset + 4)?,
        comments: row.get(offset + 5)?,
        shares: row.get(offset + 6)?,
        saves: row.get(offset + 7)?,
        engagement_rate: row.get(offset + 8)?,
    }))
}

fn map_video_with_metrics(row: &Row<'_>) -> rusqlite::Result<(SocialVideo, Option<VideoMetrics>)> {
    Ok((map_video(row)?, map_metrics_at(row, 12)?))
}

fn find_video(conn: &Connection, account_id: &str, external_id: &str) -> Result<Option<SocialVideo>> {
    conn.query_row(
        &format!(
            "SELECT {VIDEO_COLUMNS} FROM social_videos v
             WHERE v.social_account_id = ?1 AND v.external_id = ?2"
        ),
        params![account_id, external_id],
        map_video,
    )
    .optional()
    .context("Failed to look up social video")
}

impl Store {
    /// Returns the stored video for (account, external id), inserting it first
    /// when it is not known yet. Known videos are never rewritten.
    pub fn ensure_video(&self, new: &NewSocialVideo) -> Result<(SocialVideo, bool)> {
        let conn = self.conn()?;
        if let Some(existing) = find_video(&conn, &new.social_account_id, &new.external_id)? {
            return Ok((existing, false));
        }

        let video = SocialVideo {
            id: new_id(),
            social_account_id: new.social_account_id.clone(),
            platform: new.platform,
            external_id: new.external_id.clone(),
            title: new.title.clone(),
            description: new.description.clone(),
            thumbnail_url: new.thumbnail_url.clone(),
            video_url: new.video_url.clone(),
            share_url: new.share_url.clone(),
            duration: new.duration,
            published_at: new.published_at,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO social_videos (
                id, social_account_id, platform, external_id, title, description,
                thumbnail_url, video_url, share_url, duration, published_at, created_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                video.id,
                video.social_account_id,
                video.platform,
                video.external_id,
                video.title,
                video.description,
                video.thumbnail_url,
                video.video_url,
                video.share_url,
                video.duration,
                video.published_at,
                video.created_at,
            ],
        )
        .context("Failed to insert social video")?;

        Ok((video, true))
    }

    /// Appends one snapshot. Snapshots are never updated or deleted.
    pub fn append_metrics(&self, video_id: &str, snapshot: &NewMetricsSnapshot) -> Result<VideoMetrics> {
        let metrics = VideoMetrics {
            id: new_id(),
            social_video_id: video_id.to_string(),
            snapshot_time: snapshot.snapshot_time,
            views: snapshot.views,
            likes: snapshot.likes,
            comments: snapshot.comments,
            shares: snapshot.shares,
            saves: snapshot.saves,
            engagement_rate: snapshot.engagement_rate,
        };

        self.conn()?
            .execute(
                "INSERT INTO social_video_metrics (
                    id, social_video_id, snapshot_time, views, likes, comments, shares,
                    saves, engagement_rate
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    metrics.id,
                    metrics.social_video_id,
                    metrics.snapshot_time,
                    metrics.views,
                    metrics.likes,
                    metrics.comments,
                    metrics.shares,
                    metrics.saves,
                    metrics.engagement_rate,
                ],
            )
            .context("Failed to insert metrics snapshot")?;

        Ok(metrics)
    }

    /// A page of an account's videos, newest publication first, each with its
    /// latest snapshot.
    pub fn list_videos_with_latest_metrics(
        &self,
        account_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<(SocialVideo, Option<VideoMetrics>)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {VIDEO_COLUMNS}, {METRICS_COLUMNS}
                 FROM social_videos v
                 {LATEST_METRICS_JOIN}
                 WHERE v.social_account_id = ?1
                 ORDER BY v.published_at IS NULL, v.published_at DESC, v.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))
            .context("Failed to prepare list_videos query")?;
        let rows = stmt
            .query_map(params![account_id, limit, offset], map_video_with_metrics)
            .context("Failed to query videos")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read video rows")?;
        Ok(rows)
    }

    /// Every video of an account on one platform with its latest snapshot.
    pub fn all_videos_with_latest_metrics(
        &self,
        account_id: &str,
        platform: Platform,
    ) -> Result<Vec<(SocialVideo, Option<VideoMetrics>)>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {VIDEO_COLUMNS}, {METRICS_COLUMNS}
                 FROM social_videos v
                 {LATEST_METRICS_JOIN}
                 WHERE v.social_account_id = ?1 AND v.platform = ?2"
            ))
            .context("Failed to prepare all_videos query")?;
        let rows = stmt
            .query_map(params![account_id, platform], map_video_with_metrics)
            .context("Failed to query videos")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read video rows")?;
        Ok(rows)
    }

    pub fn count_videos(&self, account_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM social_videos WHERE social_account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )
        .context("Failed to count videos")
    }

    /// Number of snapshots recorded across all videos of an account.
    pub fn count_metrics_for_account(&self, account_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM social_video_metrics m
             JOIN social_videos v ON v.id = m.social_video_id
             WHERE v.social_account_id = ?1",
            params![account_id],
            |row| row.get(0),
        )
        .context("Failed to count metrics snapshots")
    }
}
