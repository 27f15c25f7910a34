//! Domain records shared by the store, the link flow and the HTTP layer.
//!
//! All records serialize in camelCase because that is what the dashboard
//! front end consumes. Secrets (password hashes, encrypted tokens) are never
//! serialized.

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported social platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Instagram, Platform::TikTok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }

    /// Path of the dashboard page OAuth callbacks return to.
    pub fn integration_path(&self) -> String {
        format!("/integrations/{}", self.as_str())
    }

    /// Path of the OAuth callback endpoint for this platform.
    pub fn callback_path(&self) -> String {
        format!("/api/auth/{}/callback", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Lifecycle status of a linked social account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Revoked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Revoked => "revoked",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "revoked" => Ok(AccountStatus::Revoked),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a stored or requested enum value is not recognised.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

macro_rules! sql_text_enum {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: UnknownVariant| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

sql_text_enum!(Platform);
sql_text_enum!(AccountStatus);

/// One OAuth-linked external identity belonging to a creator.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialAccount {
    pub id: String,
    pub creator_id: String,
    pub agency_id: String,
    pub platform: Platform,
    pub handle: String,
    pub external_id: Option<String>,
    /// Encrypted (or plaintext in development) access token.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Encrypted refresh token, for platforms that issue one.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub status: AccountStatus,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One piece of published content pulled from a platform.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialVideo {
    pub id: String,
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
    pub created_at: DateTime<Utc>,
}

/// A point-in-time snapshot of engagement counters for one video.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetrics {
    pub id: String,
    pub social_video_id: String,
    pub snapshot_time: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: Option<i64>,
    pub engagement_rate: f64,
}

/// User-editable profile fields stored as JSON on the user record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub profile: Profile,
    pub created_at: DateTime<Utc>,
}

/// Server-side session record backing a session cookie.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: String,
    pub user_id: String,
    #[serde(skip_serializing)]
    pub session_token: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub owner_user_id: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyMember {
    pub agency_id: String,
    pub user_id: String,
    pub role: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub id: String,
    pub agency_id: String,
    pub user_id: Option<String>,
    pub display_name: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: String,
    pub agency_id: String,
    pub name: String,
    pub status: String,
    pub platforms: Vec<Platform>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTask {
    pub id: String,
    pub agency_id: String,
    pub campaign_id: Option<String>,
    pub creator_id: Option<String>,
    pub title: String,
    pub status: String,
}
