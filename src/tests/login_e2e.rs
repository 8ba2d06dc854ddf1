use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::json;

use super::*;
use crate::store::{NewUser, UNUSABLE_PASSWORD, UserStore};

/// Hash of "correct horse" in Werkzeug's format.
const WERKZEUG_HASH: &str = "pbkdf2:sha256:1000$NaClSalt$d40ab484b6bc977e578a4210ede35cf71ce8f84896d8c00ec8cb59e1087e85a0";

fn valid_token() -> String {
    sign(json!({
        "id": 1,
        "email": "a@x.com",
        "role": "company_admin",
        "aud": "superset",
        "exp": in_one_hour(),
    }))
}

fn form_login(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={username}&password={password}")))
        .unwrap()
}

// =============================================================================
// Token login
// =============================================================================

#[tokio::test]
async fn test_token_login_creates_user_and_redirects() {
    let harness = TestHarness::new("");

    let response = harness
        .get(&format!("/login?token={}", valid_token()))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/superset/welcome/"
    );
    assert!(session_cookie(&response).is_some());

    let user = harness.store.find_user("a@x.com").await.unwrap().unwrap();
    assert_eq!(user.username, "a@x.com");
    assert_eq!(user.first_name, "User");
    assert_eq!(user.last_name, "1");
    assert_eq!(user.role_names(), vec!["Alpha"]);
    assert_eq!(user.password, UNUSABLE_PASSWORD);
    assert_eq!(user.login_count, 1);
}

#[tokio::test]
async fn test_token_from_cookie() {
    let harness = TestHarness::new("");

    let response = harness
        .get_with_cookie("/login", &format!("token={}", valid_token()))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(harness.store.user_count().await, 1);
}

#[tokio::test]
async fn test_token_without_id_shows_login_form() {
    let harness = TestHarness::new("");
    let token = sign(json!({
        "email": "a@x.com",
        "role": "company_admin",
        "aud": "superset",
        "exp": in_one_hour(),
    }));

    let response = harness.get(&format!("/login?token={token}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());
    let body = body_string(response).await;
    assert!(body.contains("<form"));
    assert!(!body.contains("Invalid login"));
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_expired_token_shows_login_form() {
    let harness = TestHarness::new("");
    let token = sign(json!({
        "id": 1,
        "email": "a@x.com",
        "aud": "superset",
        "exp": chrono::Utc::now().timestamp() - 3600,
    }));

    let response = harness.get(&format!("/login?token={token}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_wrong_audience_shows_login_form() {
    let harness = TestHarness::new("");
    let token = sign(json!({
        "id": 1,
        "email": "a@x.com",
        "aud": "another-app",
        "exp": in_one_hour(),
    }));

    let response = harness.get(&format!("/login?token={token}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.store.user_count().await, 0);
}

#[tokio::test]
async fn test_no_token_shows_login_form() {
    let harness = TestHarness::new(
        r#"
        [deployment.branding]
        app_name = "Acme <BI>"
        "#,
    );

    let response = harness.get("/login").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains(r#"<form method="post" action="/login">"#));
    assert!(body.contains("Acme &lt;BI&gt;"));
}

#[tokio::test]
async fn test_repeated_token_login_keeps_one_user() {
    let harness = TestHarness::new("");

    for _ in 0..2 {
        let response = harness
            .get(&format!("/login?token={}", valid_token()))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }

    assert_eq!(harness.store.user_count().await, 1);
    let user = harness.store.find_user("a@x.com").await.unwrap().unwrap();
    assert_eq!(user.login_count, 2);
}

#[tokio::test]
async fn test_unmapped_role_falls_back_to_gamma() {
    let harness = TestHarness::new("");
    let token = sign(json!({
        "id": "u-7",
        "email": "b@x.com",
        "firstName": "Bea",
        "lastName": "Smith",
        "role": "intern",
        "companyId": 42,
        "aud": "superset",
        "exp": in_one_hour(),
    }));

    let response = harness.get(&format!("/login?token={token}")).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let user = harness.store.find_user("b@x.com").await.unwrap().unwrap();
    assert_eq!(user.role_names(), vec!["Gamma"]);
    assert_eq!(user.first_name, "Bea");
    assert_eq!(user.extra["company_id"], 42);
}

#[tokio::test]
async fn test_custom_index_url() {
    let harness = TestHarness::new(
        r#"
        [auth.login]
        index_url = "/dashboard/list/"
        "#,
    );

    let response = harness
        .get(&format!("/login/?token={}", valid_token()))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/dashboard/list/");
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_me_returns_session_user() {
    let harness = TestHarness::new("");
    let login = harness
        .get(&format!("/login?token={}", valid_token()))
        .await;
    let cookie = session_cookie(&login).unwrap();

    let response = harness.get_with_cookie("/me", &cookie).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["roles"], json!(["Alpha"]));
    assert_eq!(body["login_method"], "sso");
    assert!(body.get("password").is_none());
}

#[tokio::test]
async fn test_me_without_session_is_401() {
    let harness = TestHarness::new("");

    let response = harness.get("/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness
        .get_with_cookie("/me", &format!("{SESSION_COOKIE}=not-a-session"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "session_not_found");
}

#[tokio::test]
async fn test_logout_ends_session() {
    let harness = TestHarness::new("");
    let login = harness
        .get(&format!("/login?token={}", valid_token()))
        .await;
    let cookie = session_cookie(&login).unwrap();

    let response = harness.get_with_cookie("/logout", &cookie).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");

    let response = harness.get_with_cookie("/me", &cookie).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Form login
// =============================================================================

#[tokio::test]
async fn test_form_login_with_password() {
    let harness = TestHarness::new("");
    let gamma = harness.store.find_role("Gamma").await.unwrap().unwrap();
    harness
        .store
        .add_user(NewUser {
            username: "analyst".into(),
            email: "analyst@x.com".into(),
            first_name: "Ana".into(),
            last_name: "Lyst".into(),
            password: WERKZEUG_HASH.into(),
            roles: vec![gamma],
        })
        .await
        .unwrap();

    let response = harness.send(form_login("analyst", "correct+horse")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let cookie = session_cookie(&response).unwrap();

    let response = harness.get_with_cookie("/me", &cookie).await;
    let body = body_json(response).await;
    assert_eq!(body["username"], "analyst");
    assert_eq!(body["login_method"], "password");
}

#[tokio::test]
async fn test_form_login_wrong_password() {
    let harness = TestHarness::new("");
    let gamma = harness.store.find_role("Gamma").await.unwrap().unwrap();
    harness
        .store
        .add_user(NewUser {
            username: "analyst".into(),
            email: "analyst@x.com".into(),
            first_name: "Ana".into(),
            last_name: "Lyst".into(),
            password: WERKZEUG_HASH.into(),
            roles: vec![gamma],
        })
        .await
        .unwrap();

    let response = harness.send(form_login("analyst", "battery+staple")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&response).is_none());
    assert!(body_string(response).await.contains("Invalid login"));
}

#[tokio::test]
async fn test_sso_account_cannot_use_form() {
    let harness = TestHarness::new("");
    harness
        .get(&format!("/login?token={}", valid_token()))
        .await;

    for password in ["", UNUSABLE_PASSWORD, "password"] {
        let response = harness.send(form_login("a@x.com", password)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
