//! SQLite persistence for every Urie record.
//!
//! One connection behind a mutex. Each public method holds the lock for its
//! whole body, so a lookup followed by a write inside one method is atomic
//! with respect to other requests.
//!
//! Timestamps are stored as UTC text via rusqlite's chrono support, JSON blobs
//! (profile, metadata, tags) via its serde_json support.

use anyhow::{anyhow, Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

mod accounts;
mod orgs;
mod users;
mod videos;

pub use accounts::LinkedAccount;
pub use orgs::{NewCampaign, NewContentTask, NewCreator};
pub use videos::{NewMetricsSnapshot, NewSocialVideo};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT,
    role          TEXT NOT NULL,
    profile       TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_sessions (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    session_token TEXT NOT NULL UNIQUE,
    user_agent    TEXT,
    created_at    TEXT NOT NULL,
    revoked_at    TEXT
);
CREATE INDEX IF NOT EXISTS idx_user_sessions_user ON user_sessions(user_id);

CREATE TABLE IF NOT EXISTS agencies (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    slug          TEXT NOT NULL UNIQUE,
    owner_user_id TEXT NOT NULL,
    settings      TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS agency_members (
    agency_id TEXT NOT NULL,
    user_id   TEXT NOT NULL,
    role      TEXT NOT NULL,
    PRIMARY KEY (agency_id, user_id)
);

CREATE TABLE IF NOT EXISTS creators (
    id           TEXT PRIMARY KEY,
    agency_id    TEXT NOT NULL,
    user_id      TEXT UNIQUE,
    display_name TEXT NOT NULL,
    notes        TEXT,
    tags         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS campaigns (
    id        TEXT PRIMARY KEY,
    agency_id TEXT NOT NULL,
    name      TEXT NOT NULL,
    status    TEXT NOT NULL,
    platforms TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS content_tasks (
    id          TEXT PRIMARY KEY,
    agency_id   TEXT NOT NULL,
    campaign_id TEXT,
    creator_id  TEXT,
    title       TEXT NOT NULL,
    status      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS social_accounts (
    id               TEXT PRIMARY KEY,
    creator_id       TEXT NOT NULL,
    agency_id        TEXT NOT NULL,
    platform         TEXT NOT NULL,
    handle           TEXT NOT NULL,
    external_id      TEXT,
    access_token     TEXT,
    refresh_token    TEXT,
    token_expires_at TEXT,
    status           TEXT NOT NULL,
    meta             TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE (creator_id, agency_id, platform, external_id)
);

CREATE TABLE IF NOT EXISTS social_videos (
    id                TEXT PRIMARY KEY,
    social_account_id TEXT NOT NULL,
    platform          TEXT NOT NULL,
    external_id       TEXT NOT NULL,
    title             TEXT,
    description       TEXT,
    thumbnail_url     TEXT,
    video_url         TEXT,
    share_url         TEXT,
    duration          INTEGER,
    published_at      TEXT,
    created_at        TEXT NOT NULL,
    UNIQUE (social_account_id, external_id)
);

CREATE TABLE IF NOT EXISTS social_video_metrics (
    id              TEXT PRIMARY KEY,
    social_video_id TEXT NOT NULL,
    snapshot_time   TEXT NOT NULL,
    views           INTEGER NOT NULL,
    likes           INTEGER NOT NULL,
    comments        INTEGER NOT NULL,
    shares          INTEGER NOT NULL,
    saves           INTEGER,
    engagement_rate REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metrics_video_time
    ON social_video_metrics(social_video_id, snapshot_time);
"#;

/// Handle to the Urie database.
///
/// Constructed once at startup and shared behind an `Arc`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database file and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }
}

/// Time-ordered identifier for new rows.
pub(crate) fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Decodes a JSON column into a typed value, falling back to the default when
/// the stored shape is unexpected.
pub(crate) fn json_or_default<T>(value: serde_json::Value) -> T
where
    T: serde::de::DeserializeOwned + Default,
{
    serde_json::from_value(value).unwrap_or_default()
}
