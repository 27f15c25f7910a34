// Integration tests for the OAuth account-linking flow

mod common;

use axum::{body::Body, http::{header, Request, StatusCode}};
use common::{location, seed_org, test_app};
use mockito::{Matcher, Server};
use tower::ServiceExt;
use urie::models::{AccountStatus, Platform};

fn form_post(uri: &str, form: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(form).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_instagram_callback_links_account() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/access_token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("code".into(), "abc".into()),
            Matcher::UrlEncoded("client_id".into(), "ig-id".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok"}"#)
        .expect(1)
        .create_async()
        .await;
    let profile_mock = server
        .mock("GET", "/me")
        .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "999", "username": "demo"}"#)
        .expect(1)
        .create_async()
        .await;

    let app = test_app(&server.url());
    let org = seed_org(&app.store);
    let state = app
        .signer
        .sign(&org.creator.id, &org.creator.agency_id)
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(form_post(
            "/api/auth/instagram/callback",
            &[("code", "abc"), ("state", &state)],
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "http://localhost:3000/integrations/instagram"
    );
    token_mock.assert_async().await;
    profile_mock.assert_async().await;

    let accounts = app
        .store
        .list_active_accounts(&org.creator.id, Platform::Instagram)
        .unwrap();
    assert_eq!(accounts.len(), 1);
    let account = &accounts[0];
    assert_eq!(account.external_id.as_deref(), Some("999"));
    assert_eq!(account.handle, "@demo");
    assert_eq!(account.status, AccountStatus::Active);

    // Stored encrypted, recoverable with the key
    let stored = account.access_token.as_deref().unwrap();
    assert_ne!(stored, "tok");
    assert_eq!(app.cipher.decrypt(stored).unwrap(), "tok");
}

#[tokio::test]
async fn test_callback_access_denied_writes_nothing() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/access_token")
        .expect(0)
        .create_async()
        .await;

    let app = test_app(&server.url());
    let org = seed_org(&app.store);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/instagram/callback?error=access_denied")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "http://localhost:3000/integrations/instagram?error=access_denied"
    );
    token_mock.assert_async().await;
    assert!(app
        .store
        .list_creator_accounts(&org.creator.id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_tiktok_relink_updates_existing_account() {
    let mut server = Server::new_async().await;
    let _token = server
        .mock("POST", "/oauth/token/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "act", "refresh_token": "rft", "expires_in": 86400, "open_id": "oid-1"}"#)
        .expect(2)
        .create_async()
        .await;
    let _profile = server
        .mock("GET", "/user/info/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"data": {"user": {"open_id": "oid-1", "display_name": "Jane Doe"}}}"#)
        .expect(2)
        .create_async()
        .await;

    let app = test_app(&server.url());
    let org = seed_org(&app.store);

    for _ in 0..2 {
        let state = app
            .signer
            .sign(&org.creator.id, &org.creator.agency_id)
            .unwrap();
        let uri = format!(
            "/api/auth/tiktok/callback?code=xyz&state={}",
            urlencoding::encode(&state)
        );
        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            location(&response),
            "http://localhost:3000/integrations/tiktok"
        );
    }

    assert_eq!(
        app.store
            .count_accounts_for_external_id(&org.creator.id, Platform::TikTok, "oid-1")
            .unwrap(),
        1
    );
    let accounts = app
        .store
        .list_active_accounts(&org.creator.id, Platform::TikTok)
        .unwrap();
    assert_eq!(accounts[0].handle, "@Jane_Doe");
}

#[tokio::test]
async fn test_callback_rejects_unsigned_state() {
    let server = Server::new_async().await;
    let app = test_app(&server.url());
    let org = seed_org(&app.store);

    // Bare base64 JSON, as older clients produced
    let unsigned = base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        format!(
            r#"{{"creatorId":"{}","agencyId":"{}"}}"#,
            org.creator.id, org.creator.agency_id
        ),
    );
    let uri = format!("/api/auth/instagram/callback?code=abc&state={}", unsigned);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(location(&response).contains("error=invalid_state"));
    assert!(app
        .store
        .list_creator_accounts(&org.creator.id)
        .unwrap()
        .is_empty());
}
