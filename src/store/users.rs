//! Users and their server-side sessions.

use super::{json_or_default, new_id, Store};
use crate::models::{Profile, User, UserSession};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, email, password_hash, role, profile, created_at";
const SESSION_COLUMNS: &str = "id, user_id, session_token, user_agent, created_at, revoked_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: row.get(3)?,
        profile: json_or_default(row.get(4)?),
        created_at: row.get(5)?,
    })
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<UserSession> {
    Ok(UserSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_token: row.get(2)?,
        user_agent: row.get(3)?,
        created_at: row.get(4)?,
        revoked_at: row.get(5)?,
    })
}

fn profile_json(profile: &Profile) -> Result<serde_json::Value> {
    serde_json::to_value(profile).context("Failed to serialize profile")
}

impl Store {
    /// Inserts a user. The email must already be normalised (trimmed, lower-case).
    pub fn create_user(
        &self,
        email: &str,
        password_hash: Option<&str>,
        role: &str,
        profile: &Profile,
    ) -> Result<User> {
        let user = User {
            id: new_id(),
            email: email.to_string(),
            password_hash: password_hash.map(str::to_string),
            role: role.to_string(),
            profile: profile.clone(),
            created_at: Utc::now(),
        };

        self.conn()?
            .execute(
                "INSERT INTO users (id, email, password_hash, role, profile, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    user.id,
                    user.email,
                    user.password_hash,
                    user.role,
                    profile_json(&user.profile)?,
                    user.created_at,
                ],
            )
            .context("Failed to insert user")?;

        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![user_id],
            map_user,
        )
        .optional()
        .context("Failed to load user")
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            params![email],
            map_user,
        )
        .optional()
        .context("Failed to look up user by email")
    }

    /// Lists users ordered by creation time.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"))
            .context("Failed to prepare list_users query")?;
        let users = stmt
            .query_map([], map_user)
            .context("Failed to query users")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read user rows")?;
        Ok(users)
    }

    /// Replaces the email (when given) and the profile of a user.
    pub fn update_user_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
        profile: &Profile,
    ) -> Result<Option<User>> {
        {
            let conn = self.conn()?;
            let updated = conn
                .execute(
                    "UPDATE users SET email = COALESCE(?2, email), profile = ?3 WHERE id = ?1",
                    params![user_id, email, profile_json(profile)?],
                )
                .context("Failed to update user profile")?;
            if updated == 0 {
                return Ok(None);
            }
        }
        self.get_user(user_id)
    }

    pub fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<bool> {
        let updated = self
            .conn()?
            .execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                params![user_id, password_hash],
            )
            .context("Failed to update password hash")?;
        Ok(updated > 0)
    }

    /// Hard-deletes a user after removing every session record they own.
    ///
    /// Returns false when the user did not exist.
    pub fn delete_user(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM user_sessions WHERE user_id = ?1",
            params![user_id],
        )
        .context("Failed to delete user sessions")?;
        let deleted = tx
            .execute("DELETE FROM users WHERE id = ?1", params![user_id])
            .context("Failed to delete user")?;
        tx.commit().context("Failed to commit user deletion")?;
        Ok(deleted > 0)
    }

    /// Records a new login session.
    pub fn create_session(
        &self,
        user_id: &str,
        session_token: &str,
        user_agent: Option<&str>,
    ) -> Result<UserSession> {
        let session = UserSession {
            id: new_id(),
            user_id: user_id.to_string(),
            session_token: session_token.to_string(),
            user_agent: user_agent.map(str::to_string),
            created_at: Utc::now(),
            revoked_at: None,
        };

        self.conn()?
            .execute(
                "INSERT INTO user_sessions (id, user_id, session_token, user_agent, created_at, revoked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![
                    session.id,
                    session.user_id,
                    session.session_token,
                    session.user_agent,
                    session.created_at,
                ],
            )
            .context("Failed to insert session")?;

        Ok(session)
    }

    /// Looks up a non-revoked session by its token.
    pub fn find_active_session(&self, session_token: &str) -> Result<Option<UserSession>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM user_sessions
                 WHERE session_token = ?1 AND revoked_at IS NULL"
            ),
            params![session_token],
            map_session,
        )
        .optional()
        .context("Failed to look up session")
    }

    /// Non-revoked sessions of a user, newest first.
    pub fn list_active_sessions(&self, user_id: &str) -> Result<Vec<UserSession>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM user_sessions
                 WHERE user_id = ?1 AND revoked_at IS NULL
                 ORDER BY created_at DESC"
            ))
            .context("Failed to prepare list_active_sessions query")?;
        let sessions = stmt
            .query_map(params![user_id], map_session)
            .context("Failed to query sessions")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read session rows")?;
        Ok(sessions)
    }

    /// Revokes a session of `user_id` selected by id and/or token.
    ///
    /// Only non-revoked sessions match. Returns the session as it was before
    /// revocation, or `None` when nothing matched.
    pub fn revoke_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        session_token: Option<&str>,
    ) -> Result<Option<UserSession>> {
        let conn = self.conn()?;
        let target = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM user_sessions
                     WHERE user_id = ?1
                       AND revoked_at IS NULL
                       AND (?2 IS NULL OR id = ?2)
                       AND (?3 IS NULL OR session_token = ?3)
                     LIMIT 1"
                ),
                params![user_id, session_id, session_token],
                map_session,
            )
            .optional()
            .context("Failed to look up session to revoke")?;

        let Some(target) = target else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE user_sessions SET revoked_at = ?2 WHERE id = ?1",
            params![target.id, Utc::now()],
        )
        .context("Failed to revoke session")?;

        Ok(Some(target))
    }
}
