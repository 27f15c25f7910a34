// Shared fixtures for the HTTP integration tests

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use std::sync::Arc;
use urie::api::{create_router, AppState};
use urie::config::UrieConfig;
use urie::credentials::TokenCipher;
use urie::link::StateSigner;
use urie::models::{Creator, Profile, User};
use urie::platforms::{InstagramClient, PlatformRegistry, TikTokClient};
use urie::store::{NewCreator, Store};

pub const TEST_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<Store>,
    pub cipher: TokenCipher,
    pub signer: StateSigner,
    pub config: UrieConfig,
}

/// App whose platform clients talk to `platform_base` (a mock server).
pub fn test_app(platform_base: &str) -> TestApp {
    let mut config = UrieConfig::default();
    config.instagram.client_id = Some("ig-id".to_string());
    config.instagram.client_secret = Some("ig-secret".to_string());
    config.tiktok.client_id = Some("ck".to_string());
    config.tiktok.client_secret = Some("cs".to_string());

    let store = Arc::new(Store::in_memory().unwrap());
    let cipher = TokenCipher::from_hex_key(Some(TEST_KEY_HEX)).unwrap();
    let signer = StateSigner::new(b"integration-secret", 600).unwrap();

    let mut platforms = PlatformRegistry::default();
    platforms.insert(Arc::new(
        InstagramClient::with_base_url("ig-id", "ig-secret", platform_base).unwrap(),
    ));
    platforms.insert(Arc::new(
        TikTokClient::with_base_url("ck", "cs", platform_base).unwrap(),
    ));

    let state = AppState {
        store: store.clone(),
        cipher: cipher.clone(),
        signer: signer.clone(),
        platforms,
        config: config.clone(),
    };

    TestApp {
        router: create_router(state),
        store,
        cipher,
        signer,
        config,
    }
}

/// Agency owner plus a creator user linked to a creator record.
pub struct Org {
    pub owner: User,
    pub creator_user: User,
    pub creator: Creator,
}

pub fn seed_org(store: &Store) -> Org {
    let owner = store
        .create_user("owner@urie.demo", None, "agency_user", &Profile::default())
        .unwrap();
    let creator_user = store
        .create_user("creator@urie.demo", None, "creator", &Profile::default())
        .unwrap();
    let agency = store
        .create_agency("Agency", "agency", &owner.id, serde_json::json!({}))
        .unwrap();
    let creator = store
        .create_creator(&NewCreator {
            agency_id: &agency.id,
            user_id: Some(&creator_user.id),
            display_name: "Creator",
            notes: None,
            tags: &[],
        })
        .unwrap();
    Org {
        owner,
        creator_user,
        creator,
    }
}

/// Opens a session for `user` and returns its token.
pub fn login_as(store: &Store, user: &User) -> String {
    let token = format!("token-{}", user.id);
    store.create_session(&user.id, &token, Some("test")).unwrap();
    token
}

pub fn request(method: &str, uri: &str, token: Option<&str>, json: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match json {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}
