//! Demo data: one agency, its staff, two creators with social accounts, a
//! campaign and two content tasks. Every demo user logs in with
//! [`DEMO_PASSWORD`].

use crate::auth::hash_password;
use crate::models::{Platform, Profile};
use crate::store::{NewCampaign, NewContentTask, NewCreator, Store};
use anyhow::Result;
use serde_json::json;
use tracing::info;

pub const DEMO_PASSWORD: &str = "demo1234";

/// What [`seed_demo`] created.
#[derive(Debug)]
pub struct SeedSummary {
    pub agency_slug: String,
    pub users: Vec<String>,
    pub campaign: String,
    pub content_tasks: usize,
}

fn profile(name: &str, bio: &str) -> Profile {
    Profile {
        name: Some(name.to_string()),
        avatar: None,
        bio: Some(bio.to_string()),
    }
}

/// Populates an empty store. Returns `None` without writing anything when the
/// store already has users.
pub fn seed_demo(store: &Store) -> Result<Option<SeedSummary>> {
    if !store.list_users()?.is_empty() {
        info!("Store already has users; skipping demo seed");
        return Ok(None);
    }

    let hash = hash_password(DEMO_PASSWORD)?;

    let owner = store.create_user(
        "alex@urie.demo",
        Some(&hash),
        "agency_user",
        &profile("Alex Agency", "Agency owner"),
    )?;
    let manager = store.create_user(
        "jordan@urie.demo",
        Some(&hash),
        "agency_user",
        &profile("Jordan Manager", "Campaign manager"),
    )?;
    let sam = store.create_user(
        "sam@urie.demo",
        Some(&hash),
        "creator",
        &profile("Sam Creator", "IG & TikTok creator"),
    )?;
    let riley = store.create_user(
        "riley@urie.demo",
        Some(&hash),
        "creator",
        &profile("Riley Creator", "Content creator"),
    )?;

    let agency = store.create_agency(
        "Urie Demo Agency",
        "urie-demo-agency",
        &owner.id,
        json!({
            "time_zone": "America/Los_Angeles",
            "default_platforms": ["instagram", "tiktok"],
        }),
    )?;
    store.add_agency_member(&agency.id, &manager.id, "manager")?;

    let sam_creator = store.create_creator(&NewCreator {
        agency_id: &agency.id,
        user_id: Some(&sam.id),
        display_name: "Sam Creator",
        notes: Some("Main IG & TikTok creator"),
        tags: &["beauty", "lifestyle"],
    })?;
    let riley_creator = store.create_creator(&NewCreator {
        agency_id: &agency.id,
        user_id: Some(&riley.id),
        display_name: "Riley Creator",
        notes: Some("Short-form specialist"),
        tags: &["tech", "UGC"],
    })?;

    store.insert_unlinked_account(
        &sam_creator.id,
        &agency.id,
        Platform::Instagram,
        "@sam.creates",
        json!({ "follower_count": 12500 }),
    )?;
    store.insert_unlinked_account(
        &sam_creator.id,
        &agency.id,
        Platform::TikTok,
        "@sam.creates",
        json!({ "follower_count": 8200 }),
    )?;
    store.insert_unlinked_account(
        &riley_creator.id,
        &agency.id,
        Platform::Instagram,
        "@riley.reels",
        json!({ "follower_count": 5600 }),
    )?;

    let campaign = store.create_campaign(&NewCampaign {
        agency_id: &agency.id,
        name: "Spring 2025 Launch",
        status: "active",
        platforms: &[Platform::Instagram, Platform::TikTok],
    })?;

    let tasks = [
        (&sam_creator.id, "IG Reel - Unboxing", "backlog"),
        (&riley_creator.id, "TikTok - First impression", "in_progress"),
    ];
    for (creator_id, title, status) in tasks {
        store.create_content_task(&NewContentTask {
            agency_id: &agency.id,
            campaign_id: Some(&campaign.id),
            creator_id: Some(creator_id),
            title,
            status,
        })?;
    }

    let summary = SeedSummary {
        agency_slug: agency.slug,
        users: vec![owner.email, manager.email, sam.email, riley.email],
        campaign: campaign.name,
        content_tasks: tasks.len(),
    };
    info!(
        agency = %summary.agency_slug,
        users = summary.users.len(),
        campaign = %summary.campaign,
        "Demo data seeded"
    );
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;

    #[test]
    fn test_seed_populates_empty_store() {
        let store = Store::in_memory().unwrap();
        let summary = seed_demo(&store).unwrap().unwrap();

        assert_eq!(summary.agency_slug, "urie-demo-agency");
        assert_eq!(summary.users.len(), 4);
        assert_eq!(summary.content_tasks, 2);

        let alex = store.find_user_by_email("alex@urie.demo").unwrap().unwrap();
        assert!(verify_password(DEMO_PASSWORD, alex.password_hash.as_deref().unwrap()).unwrap());

        let agencies = store.list_agencies_for_user(&alex.id).unwrap();
        assert_eq!(agencies.len(), 1);
        let creators = store.list_creators(&agencies[0].id).unwrap();
        assert_eq!(creators.len(), 2);
        assert_eq!(store.count_content_tasks(&agencies[0].id).unwrap(), 2);

        let jordan = store.find_user_by_email("jordan@urie.demo").unwrap().unwrap();
        assert!(store.is_agency_member(&agencies[0].id, &jordan.id).unwrap());
    }

    #[test]
    fn test_seed_skips_non_empty_store() {
        let store = Store::in_memory().unwrap();
        store
            .create_user("someone@example.com", None, "agency_user", &Profile::default())
            .unwrap();

        assert!(seed_demo(&store).unwrap().is_none());
        assert_eq!(store.list_users().unwrap().len(), 1);
    }
}
