use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header as header_matcher, method, path},
};

use super::*;
use crate::{
    services::{BulkSyncClient, BulkSyncError, RoleMapper, UserSyncService},
    store::UserStore,
};

const SYNC_TOKEN: &str = "sync-token";

fn sync_config(server: &MockServer) -> String {
    format!(
        r#"
        [sync]
        api_url = "{}/api/users"
        api_token = "{SYNC_TOKEN}"
        "#,
        server.uri()
    )
}

async fn mount_users(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .and(header_matcher("authorization", "Bearer sync-token"))
        .and(header_matcher("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

fn admin_sync_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/admin/sync");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn client(store: Arc<MemoryUserStore>) -> BulkSyncClient {
    BulkSyncClient::new(
        reqwest::Client::new(),
        UserSyncService::new(store, Arc::new(RoleMapper::default())),
    )
}

// =============================================================================
// Bulk sync
// =============================================================================

#[tokio::test]
async fn test_failed_api_response_writes_nothing() {
    let server = MockServer::start().await;
    mount_users(&server, 200, json!({"success": false, "data": []})).await;

    let store = Arc::new(MemoryUserStore::new());
    let err = client(store.clone())
        .sync_all(&format!("{}/api/users", server.uri()), SYNC_TOKEN)
        .await
        .unwrap_err();

    assert!(matches!(err, BulkSyncError::Rejected));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_non_success_status_aborts() {
    let server = MockServer::start().await;
    mount_users(&server, 500, json!({"error": "boom"})).await;

    let store = Arc::new(MemoryUserStore::new());
    let err = client(store.clone())
        .sync_all(&format!("{}/api/users", server.uri()), SYNC_TOKEN)
        .await
        .unwrap_err();

    assert!(matches!(err, BulkSyncError::Status(s) if s.as_u16() == 500));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_record_without_email_is_skipped() {
    let server = MockServer::start().await;
    mount_users(
        &server,
        200,
        json!({
            "success": true,
            "data": [
                {"id": 1, "email": "one@x.com", "name": "Jane Doe", "role": "company_owner",
                 "primaryCompany": {"id": 10}},
                {"id": 2, "email": "two@x.com", "name": "Madonna", "role": "company_viewer",
                 "companies": [{"company": {"id": 20}}]},
                {"id": 3, "email": "three@x.com", "name": "", "role": "super_admin"},
                {"id": 4, "name": "No Email", "role": "company_user"}
            ]
        }),
    )
    .await;

    let store = Arc::new(MemoryUserStore::new());
    let report = client(store.clone())
        .sync_all(&format!("{}/api/users", server.uri()), SYNC_TOKEN)
        .await
        .unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.synced, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(store.user_count().await, 3);

    let one = store.find_user("one@x.com").await.unwrap().unwrap();
    assert_eq!((one.first_name.as_str(), one.last_name.as_str()), ("Jane", "Doe"));
    assert_eq!(one.role_names(), vec!["Alpha"]);
    assert_eq!(one.extra["company_id"], 10);

    let two = store.find_user("two@x.com").await.unwrap().unwrap();
    assert_eq!(two.last_name, "2");
    assert_eq!(two.role_names(), vec!["Public"]);
    assert_eq!(two.extra["company_id"], 20);

    let three = store.find_user("three@x.com").await.unwrap().unwrap();
    assert_eq!(three.first_name, "User");
    assert_eq!(three.role_names(), vec!["Admin"]);
}

#[tokio::test]
async fn test_bad_record_does_not_stop_batch() {
    let server = MockServer::start().await;
    mount_users(
        &server,
        200,
        json!({
            "success": true,
            "data": [
                "not an object",
                {"id": 1, "email": "one@x.com", "name": "Jane Doe"}
            ]
        }),
    )
    .await;

    let store = Arc::new(MemoryUserStore::new());
    let report = client(store.clone())
        .sync_all(&format!("{}/api/users", server.uri()), SYNC_TOKEN)
        .await
        .unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.skipped, 1);
}

// =============================================================================
// Admin endpoints
// =============================================================================

#[tokio::test]
async fn test_admin_sync_reports_counts() {
    let server = MockServer::start().await;
    mount_users(
        &server,
        200,
        json!({
            "success": true,
            "data": [
                {"id": 1, "email": "one@x.com", "name": "Jane Doe"},
                {"id": 2, "name": "No Email"}
            ]
        }),
    )
    .await;
    let harness = TestHarness::new(&sync_config(&server));

    let response = harness.send(admin_sync_request(Some(ADMIN_TOKEN))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({"total": 2, "synced": 1, "skipped": 1}));
}

#[tokio::test]
async fn test_admin_sync_upstream_failure_is_502() {
    let server = MockServer::start().await;
    mount_users(&server, 200, json!({"success": false})).await;
    let harness = TestHarness::new(&sync_config(&server));

    let response = harness.send(admin_sync_request(Some(ADMIN_TOKEN))).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(harness.store.write_count(), 0);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let harness = TestHarness::new("");

    let response = harness.send(admin_sync_request(None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness.send(admin_sync_request(Some("wrong"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_sync_without_sync_config_is_400() {
    let harness = TestHarness::new("");

    let response = harness.send(admin_sync_request(Some(ADMIN_TOKEN))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "not_configured");
}

#[tokio::test]
async fn test_issued_token_logs_in() {
    let harness = TestHarness::new("");

    let response = harness
        .send(
            Request::builder()
                .method("POST")
                .uri("/admin/tokens")
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "user_id": "42",
                        "email": "jane@x.com",
                        "name": "Jane Doe",
                        "role": "company_manager",
                        "company_id": "7"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let token = body["token"].as_str().unwrap();
    assert_eq!(
        body["login_url"],
        format!("http://localhost:3200/login?token={token}")
    );

    let response = harness.get(&format!("/login?token={token}")).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let user = harness.store.find_user("jane@x.com").await.unwrap().unwrap();
    assert_eq!((user.first_name.as_str(), user.last_name.as_str()), ("Jane", "Doe"));
    assert_eq!(user.role_names(), vec!["Gamma"]);
    assert_eq!(user.extra["company_id"], "7");
}

// =============================================================================
// Health and deployment
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let harness = TestHarness::new("");

    let response = harness.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["subsystems"]["user_store"]["healthy"], true);

    assert_eq!(harness.get("/health/live").await.status(), StatusCode::OK);
    assert_eq!(harness.get("/health/ready").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_deployment_hides_connection_strings() {
    let harness = TestHarness::new(
        r#"
        [deployment.branding]
        app_name = "Acme BI"

        [deployment.feature_flags]
        DASHBOARD_RBAC = true

        [deployment.cache]
        redis_url = "redis://:hunter2@redis:6379/1"

        [deployment.additional_databases.warehouse]
        sqlalchemy_uri = "postgresql://bi:hunter2@db/warehouse"
        description = "Main warehouse"
        "#,
    );

    let response = harness.get("/api/v1/deployment").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["branding"]["app_name"], "Acme BI");
    assert_eq!(body["feature_flags"]["DASHBOARD_RBAC"], true);
    assert_eq!(body["databases"][0]["name"], "warehouse");
    assert!(!body.to_string().contains("hunter2"));
}
