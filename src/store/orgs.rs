//! Agencies, their members, creators, campaigns and content tasks.

use super::{json_or_default, new_id, Store};
use crate::models::{Agency, AgencyMember, Campaign, ContentTask, Creator, Platform};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const AGENCY_COLUMNS: &str = "id, name, slug, owner_user_id, settings, created_at";
const CREATOR_COLUMNS: &str = "id, agency_id, user_id, display_name, notes, tags";

pub struct NewCreator<'a> {
    pub agency_id: &'a str,
    pub user_id: Option<&'a str>,
    pub display_name: &'a str,
    pub notes: Option<&'a str>,
    pub tags: &'a [&'a str],
}

pub struct NewCampaign<'a> {
    pub agency_id: &'a str,
    pub name: &'a str,
    pub status: &'a str,
    pub platforms: &'a [Platform],
}

pub struct NewContentTask<'a> {
    pub agency_id: &'a str,
    pub campaign_id: Option<&'a str>,
    pub creator_id: Option<&'a str>,
    pub title: &'a str,
    pub status: &'a str,
}

fn map_agency(row: &Row<'_>) -> rusqlite::Result<Agency> {
    Ok(Agency {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        owner_user_id: row.get(3)?,
        settings: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_creator(row: &Row<'_>) -> rusqlite::Result<Creator> {
    Ok(Creator {
        id: row.get(0)?,
        agency_id: row.get(1)?,
        user_id: row.get(2)?,
        display_name: row.get(3)?,
        notes: row.get(4)?,
        tags: json_or_default(row.get(5)?),
    })
}

impl Store {
    /// Creates an agency and registers its owner as an `owner` member.
    pub fn create_agency(
        &self,
        name: &str,
        slug: &str,
        owner_user_id: &str,
        settings: serde_json::Value,
    ) -> Result<Agency> {
        let agency = Agency {
            id: new_id(),
            name: name.to_string(),
            slug: slug.to_string(),
            owner_user_id: owner_user_id.to_string(),
            settings: if settings.is_object() {
                settings
            } else {
                serde_json::json!({})
            },
            created_at: Utc::now(),
        };

        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO agencies (id, name, slug, owner_user_id, settings, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                agency.id,
                agency.name,
                agency.slug,
                agency.owner_user_id,
                agency.settings,
                agency.created_at,
            ],
        )
        .context("Failed to insert agency")?;
        tx.execute(
            "INSERT OR REPLACE INTO agency_members (agency_id, user_id, role) VALUES (?1, ?2, 'owner')",
            params![agency.id, agency.owner_user_id],
        )
        .context("Failed to insert agency owner membership")?;
        tx.commit().context("Failed to commit agency creation")?;

        Ok(agency)
    }

    pub fn add_agency_member(&self, agency_id: &str, user_id: &str, role: &str) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO agency_members (agency_id, user_id, role) VALUES (?1, ?2, ?3)",
                params![agency_id, user_id, role],
            )
            .context("Failed to insert agency member")?;
        Ok(())
    }

    pub fn list_agency_members(&self, agency_id: &str) -> Result<Vec<AgencyMember>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT agency_id, user_id, role FROM agency_members
                 WHERE agency_id = ?1 ORDER BY user_id",
            )
            .context("Failed to prepare list_agency_members query")?;
        let members = stmt
            .query_map(params![agency_id], |row| {
                Ok(AgencyMember {
                    agency_id: row.get(0)?,
                    user_id: row.get(1)?,
                    role: row.get(2)?,
                })
            })
            .context("Failed to query agency members")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read agency member rows")?;
        Ok(members)
    }

    /// True when the user owns the agency or is one of its members.
    pub fn is_agency_member(&self, agency_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM agencies WHERE id = ?1 AND owner_user_id = ?2
                 UNION
                 SELECT 1 FROM agency_members WHERE agency_id = ?1 AND user_id = ?2",
                params![agency_id, user_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to check agency membership")?;
        Ok(found.is_some())
    }

    /// Agencies the user owns or belongs to, oldest first.
    pub fn list_agencies_for_user(&self, user_id: &str) -> Result<Vec<Agency>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {AGENCY_COLUMNS} FROM agencies
                 WHERE owner_user_id = ?1
                    OR id IN (SELECT agency_id FROM agency_members WHERE user_id = ?1)
                 ORDER BY created_at ASC"
            ))
            .context("Failed to prepare list_agencies_for_user query")?;
        let agencies = stmt
            .query_map(params![user_id], map_agency)
            .context("Failed to query agencies")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read agency rows")?;
        Ok(agencies)
    }

    pub fn create_creator(&self, new: &NewCreator<'_>) -> Result<Creator> {
        let creator = Creator {
            id: new_id(),
            agency_id: new.agency_id.to_string(),
            user_id: new.user_id.map(str::to_string),
            display_name: new.display_name.to_string(),
            notes: new.notes.map(str::to_string),
            tags: new.tags.iter().map(|t| t.to_string()).collect(),
        };

        self.conn()?
            .execute(
                "INSERT INTO creators (id, agency_id, user_id, display_name, notes, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    creator.id,
                    creator.agency_id,
                    creator.user_id,
                    creator.display_name,
                    creator.notes,
                    serde_json::to_value(&creator.tags).context("Failed to serialize tags")?,
                ],
            )
            .context("Failed to insert creator")?;

        Ok(creator)
    }

    pub fn get_creator(&self, creator_id: &str) -> Result<Option<Creator>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CREATOR_COLUMNS} FROM creators WHERE id = ?1"),
            params![creator_id],
            map_creator,
        )
        .optional()
        .context("Failed to load creator")
    }

    /// The creator record linked to a user account, if any.
    pub fn find_creator_by_user(&self, user_id: &str) -> Result<Option<Creator>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CREATOR_COLUMNS} FROM creators WHERE user_id = ?1"),
            params![user_id],
            map_creator,
        )
        .optional()
        .context("Failed to look up creator by user")
    }

    pub fn list_creators(&self, agency_id: &str) -> Result<Vec<Creator>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CREATOR_COLUMNS} FROM creators WHERE agency_id = ?1 ORDER BY display_name"
            ))
            .context("Failed to prepare list_creators query")?;
        let creators = stmt
            .query_map(params![agency_id], map_creator)
            .context("Failed to query creators")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read creator rows")?;
        Ok(creators)
    }

    pub fn create_campaign(&self, new: &NewCampaign<'_>) -> Result<Campaign> {
        let campaign = Campaign {
            id: new_id(),
            agency_id: new.agency_id.to_string(),
            name: new.name.to_string(),
            status: new.status.to_string(),
            platforms: new.platforms.to_vec(),
        };

        self.conn()?
            .execute(
                "INSERT INTO campaigns (id, agency_id, name, status, platforms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    campaign.id,
                    campaign.agency_id,
                    campaign.name,
                    campaign.status,
                    serde_json::to_value(&campaign.platforms)
                        .context("Failed to serialize platforms")?,
                ],
            )
            .context("Failed to insert campaign")?;

        Ok(campaign)
    }

    pub fn list_campaigns(&self, agency_id: &str) -> Result<Vec<Campaign>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, agency_id, name, status, platforms FROM campaigns
                 WHERE agency_id = ?1 ORDER BY name",
            )
            .context("Failed to prepare list_campaigns query")?;
        let campaigns = stmt
            .query_map(params![agency_id], |row| {
                Ok(Campaign {
                    id: row.get(0)?,
                    agency_id: row.get(1)?,
                    name: row.get(2)?,
                    status: row.get(3)?,
                    platforms: json_or_default(row.get(4)?),
                })
            })
            .context("Failed to query campaigns")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read campaign rows")?;
        Ok(campaigns)
    }

    pub fn create_content_task(&self, new: &NewContentTask<'_>) -> Result<ContentTask> {
        let task = ContentTask {
            id: new_id(),
            agency_id: new.agency_id.to_string(),
            campaign_id: new.campaign_id.map(str::to_string),
            creator_id: new.creator_id.map(str::to_string),
            title: new.title.to_string(),
            status: new.status.to_string(),
        };

        self.conn()?
            .execute(
                "INSERT INTO content_tasks (id, agency_id, campaign_id, creator_id, title, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task.id,
                    task.agency_id,
                    task.campaign_id,
                    task.creator_id,
                    task.title,
                    task.status,
                ],
            )
            .context("Failed to insert content task")?;

        Ok(task)
    }

    pub fn count_content_tasks(&self, agency_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM content_tasks WHERE agency_id = ?1",
            params![agency_id],
            |row| row.get(0),
        )
        .context("Failed to count content tasks")
    }
}
