//! Linked social accounts.

use super::{new_id, Store};
use crate::models::{AccountStatus, Platform, SocialAccount};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const ACCOUNT_COLUMNS: &str = "id, creator_id, agency_id, platform, handle, external_id, \
     access_token, refresh_token, token_expires_at, status, meta, created_at, updated_at";

/// Result of a successful OAuth callback, ready to persist.
///
/// Token fields must already be encrypted by the caller.
#[derive(Clone, Debug)]
pub struct LinkedAccount {
    pub creator_id: String,
    pub agency_id: String,
    pub platform: Platform,
    pub external_id: String,
    pub handle: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub meta: serde_json::Value,
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<SocialAccount> {
    Ok(SocialAccount {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        agency_id: row.get(2)?,
        platform: row.get(3)?,
        handle: row.get(4)?,
        external_id: row.get(5)?,
        access_token: row.get(6)?,
        refresh_token: row.get(7)?,
        token_expires_at: row.get(8)?,
        status: row.get(9)?,
        meta: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn load_account(conn: &Connection, account_id: &str) -> Result<Option<SocialAccount>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE id = ?1"),
        params![account_id],
        map_account,
    )
    .optional()
    .context("Failed to load social account")
}

impl Store {
    /// Inserts or refreshes the account identified by
    /// (creator, agency, platform, external id).
    ///
    /// An existing row keeps its id and creation time; handle, tokens and
    /// metadata are replaced and the status goes back to `active`. Returns the
    /// stored account and whether it was newly created.
    pub fn upsert_linked_account(&self, linked: &LinkedAccount) -> Result<(SocialAccount, bool)> {
        let meta = if linked.meta.is_object() {
            linked.meta.clone()
        } else {
            serde_json::json!({})
        };
        let now = Utc::now();

        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM social_accounts
                 WHERE creator_id = ?1 AND agency_id = ?2 AND platform = ?3 AND external_id = ?4",
                params![
                    linked.creator_id,
                    linked.agency_id,
                    linked.platform,
                    linked.external_id
                ],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up existing social account")?;

        let (account_id, created) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE social_accounts
                     SET handle = ?2, access_token = ?3, refresh_token = ?4,
                         token_expires_at = ?5, status = ?6, meta = ?7, updated_at = ?8
                     WHERE id = ?1",
                    params![
                        id,
                        linked.handle,
                        linked.access_token,
                        linked.refresh_token,
                        linked.token_expires_at,
                        AccountStatus::Active,
                        meta,
                        now,
                    ],
                )
                .context("Failed to update social account")?;
                (id, false)
            }
            None => {
                let id = new_id();
                tx.execute(
                    "INSERT INTO social_accounts (
                        id, creator_id, agency_id, platform, handle, external_id,
                        access_token, refresh_token, token_expires_at, status, meta,
                        created_at, updated_at
                     )
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
                    params![
                        id,
                        linked.creator_id,
                        linked.agency_id,
                        linked.platform,
                        linked.handle,
                        linked.external_id,
                        linked.access_token,
                        linked.refresh_token,
                        linked.token_expires_at,
                        AccountStatus::Active,
                        meta,
                        now,
                    ],
                )
                .context("Failed to insert social account")?;
                (id, true)
            }
        };

        let account = load_account(&tx, &account_id)?
            .context("Social account vanished after upsert")?;
        tx.commit().context("Failed to commit social account upsert")?;

        Ok((account, created))
    }

    /// Inserts an account without OAuth tokens (seed data, manual entries).
    pub fn insert_unlinked_account(
        &self,
        creator_id: &str,
        agency_id: &str,
        platform: Platform,
        handle: &str,
        meta: serde_json::Value,
    ) -> Result<SocialAccount> {
        let id = new_id();
        let now = Utc::now();
        let meta = if meta.is_object() { meta } else { serde_json::json!({}) };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO social_accounts (
                id, creator_id, agency_id, platform, handle, external_id,
                access_token, refresh_token, token_expires_at, status, meta,
                created_at, updated_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, NULL, NULL, ?6, ?7, ?8, ?8)",
            params![
                id,
                creator_id,
                agency_id,
                platform,
                handle,
                AccountStatus::Active,
                meta,
                now
            ],
        )
        .context("Failed to insert social account")?;

        load_account(&conn, &id)?.context("Social account vanished after insert")
    }

    pub fn get_social_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let conn = self.conn()?;
        load_account(&conn, account_id)
    }

    /// Active accounts of a creator on one platform, oldest first.
    pub fn list_active_accounts(
        &self,
        creator_id: &str,
        platform: Platform,
    ) -> Result<Vec<SocialAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM social_accounts
                 WHERE creator_id = ?1 AND platform = ?2 AND status = ?3
                 ORDER BY created_at ASC"
            ))
            .context("Failed to prepare list_active_accounts query")?;
        let accounts = stmt
            .query_map(
                params![creator_id, platform, AccountStatus::Active],
                map_account,
            )
            .context("Failed to query social accounts")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read social account rows")?;
        Ok(accounts)
    }

    /// Every account of a creator regardless of platform or status.
    pub fn list_creator_accounts(&self, creator_id: &str) -> Result<Vec<SocialAccount>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM social_accounts
                 WHERE creator_id = ?1 ORDER BY platform, created_at"
            ))
            .context("Failed to prepare list_creator_accounts query")?;
        let accounts = stmt
            .query_map(params![creator_id], map_account)
            .context("Failed to query social accounts")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read social account rows")?;
        Ok(accounts)
    }

    /// Soft-deletes an account: status `revoked`, both tokens cleared.
    ///
    /// Content and metric history stay untouched. Returns false when the
    /// account does not exist.
    pub fn revoke_social_account(&self, account_id: &str) -> Result<bool> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE social_accounts
                 SET status = ?2, access_token = NULL, refresh_token = NULL,
                     token_expires_at = NULL, updated_at = ?3
                 WHERE id = ?1",
                params![account_id, AccountStatus::Revoked, Utc::now()],
            )
            .context("Failed to revoke social account")?;
        Ok(updated > 0)
    }

    /// Number of account rows for a (creator, platform, external id) triple.
    pub fn count_accounts_for_external_id(
        &self,
        creator_id: &str,
        platform: Platform,
        external_id: &str,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM social_accounts
             WHERE creator_id = ?1 AND platform = ?2 AND external_id = ?3",
            params![creator_id, platform, external_id],
            |row| row.get(0),
        )
        .context("Failed to count social accounts")
    }
}
