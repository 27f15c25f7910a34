// Integration tests for signup, login and account self-service

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, request, test_app};
use serde_json::json;
use tower::ServiceExt;

async fn signup_and_login(app: &common::TestApp, email: &str, password: &str) -> String {
    let response = app
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/api/auth/signup",
            None,
            Some(json!({"email": email, "password": password, "name": "Alex"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": email, "password": password})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("urie_session="));
    assert!(cookie.contains("HttpOnly"));

    let json = body_json(response).await;
    let token = json["sessionToken"].as_str().unwrap().to_string();
    assert!(cookie.contains(&token));
    token
}

#[tokio::test]
async fn test_signup_validation() {
    let app = test_app("http://127.0.0.1:9");

    let cases = [
        (json!({"email": "", "password": "longenough"}), StatusCode::BAD_REQUEST),
        (json!({"email": "a@urie.demo", "password": "short"}), StatusCode::BAD_REQUEST),
        (json!({"email": "A@Urie.Demo ", "password": "longenough"}), StatusCode::OK),
        (json!({"email": "a@urie.demo", "password": "longenough"}), StatusCode::CONFLICT),
    ];
    for (body, status) in cases {
        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/auth/signup", None, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), status);
    }
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let app = test_app("http://127.0.0.1:9");
    signup_and_login(&app, "alex@urie.demo", "demo1234").await;

    let response = app
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "alex@urie.demo", "password": "wrong-password"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_account_endpoints_require_session() {
    let app = test_app("http://127.0.0.1:9");
    for (method, uri) in [
        ("GET", "/api/account/profile"),
        ("GET", "/api/account/sessions"),
        ("DELETE", "/api/account"),
    ] {
        let response = app
            .router
            .clone()
            .oneshot(request(method, uri, None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_revoking_current_session_logs_out() {
    let app = test_app("http://127.0.0.1:9");
    let token = signup_and_login(&app, "alex@urie.demo", "demo1234").await;

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/account/sessions", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let sessions = json["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["isCurrent"], true);

    let uri = format!("/api/account/sessions?sessionToken={}", token);
    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", &uri, Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
    assert_eq!(json["revokedCurrentSession"], true);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/account/profile", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_session_validation() {
    let app = test_app("http://127.0.0.1:9");
    let token = signup_and_login(&app, "alex@urie.demo", "demo1234").await;

    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", "/api/account/sessions", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "DELETE",
            "/api/account/sessions?id=does-not-exist",
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_update() {
    let app = test_app("http://127.0.0.1:9");
    let token = signup_and_login(&app, "alex@urie.demo", "demo1234").await;
    signup_and_login(&app, "taken@urie.demo", "demo1234").await;

    let response = app
        .router
        .clone()
        .oneshot(request(
            "PATCH",
            "/api/account/profile",
            Some(&token),
            Some(json!({"name": " Alex Kim ", "bio": "Agency owner"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["profile"]["name"], "Alex Kim");
    assert_eq!(json["profile"]["bio"], "Agency owner");
    assert_eq!(json["email"], "alex@urie.demo");

    let cases = [
        (json!({"email": "not-an-email"}), StatusCode::BAD_REQUEST),
        (json!({"email": "taken@urie.demo"}), StatusCode::CONFLICT),
        (json!({"avatar": "x".repeat(512 * 1024 + 1)}), StatusCode::BAD_REQUEST),
        (json!({"bio": ""}), StatusCode::OK),
    ];
    for (body, status) in cases {
        let response = app
            .router
            .clone()
            .oneshot(request("PATCH", "/api/account/profile", Some(&token), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), status);
    }

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/account/profile", Some(&token), None))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["profile"]["name"], "Alex Kim");
    assert!(json["profile"]["bio"].is_null());
}

#[tokio::test]
async fn test_change_password() {
    let app = test_app("http://127.0.0.1:9");
    let token = signup_and_login(&app, "alex@urie.demo", "demo1234").await;

    let bad = [
        json!({"newPassword": "newpassword"}),
        json!({"currentPassword": "demo1234", "newPassword": "short"}),
        json!({"currentPassword": "wrong-one", "newPassword": "newpassword"}),
    ];
    for body in bad {
        let response = app
            .router
            .clone()
            .oneshot(request("PATCH", "/api/account/password", Some(&token), Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let response = app
        .router
        .clone()
        .oneshot(request(
            "PATCH",
            "/api/account/password",
            Some(&token),
            Some(json!({"currentPassword": "demo1234", "newPassword": "newpassword"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({"email": "alex@urie.demo", "password": "newpassword"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_account() {
    let app = test_app("http://127.0.0.1:9");
    let token = signup_and_login(&app, "alex@urie.demo", "demo1234").await;

    let response = app
        .router
        .clone()
        .oneshot(request("DELETE", "/api/account", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(app.store.find_user_by_email("alex@urie.demo").unwrap().is_none());
    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/account/profile", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout() {
    let app = test_app("http://127.0.0.1:9");
    let token = signup_and_login(&app, "alex@urie.demo", "demo1234").await;

    let response = app
        .router
        .clone()
        .oneshot(request("POST", "/api/auth/logout", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(request("GET", "/api/account/sessions", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
